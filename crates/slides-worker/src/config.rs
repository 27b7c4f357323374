//! Worker configuration.

use std::path::{Path, PathBuf};

use slides_models::ExclusionEntry;
use tracing::warn;

use crate::error::{WorkerError, WorkerResult};
use crate::retry::RetryConfig;

/// Largest resize target that still triggers resizing before classification.
pub const AI_RESIZE_CEILING: (u32, u32) = (1920, 1080);

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Hamming distance at or below which two hashes match
    pub phash_threshold: u32,
    /// Images per classification request
    pub batch_size: usize,
    /// Width images are shrunk to before classification
    pub ai_resize_width: u32,
    pub ai_resize_height: u32,
    pub enable_duplicate_removal: bool,
    pub enable_exclusion_list: bool,
    pub enable_ai_filtering: bool,
    /// Reference images to discard; inactive presets are filtered at match time
    pub exclusion_list: Vec<ExclusionEntry>,
    pub retry: RetryConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            phash_threshold: 10,
            batch_size: 4,
            ai_resize_width: 768,
            ai_resize_height: 432,
            enable_duplicate_removal: true,
            enable_exclusion_list: true,
            enable_ai_filtering: true,
            exclusion_list: Vec::new(),
            retry: RetryConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let exclusion_list = match std::env::var("EXCLUSION_LIST_FILE").ok().map(PathBuf::from) {
            Some(path) => load_exclusion_list(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Ignoring exclusion list");
                Vec::new()
            }),
            None => Vec::new(),
        };

        Self {
            phash_threshold: std::env::var("PHASH_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.phash_threshold),
            batch_size: std::env::var("AI_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.batch_size),
            ai_resize_width: std::env::var("AI_IMAGE_RESIZE_WIDTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.ai_resize_width),
            ai_resize_height: std::env::var("AI_IMAGE_RESIZE_HEIGHT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.ai_resize_height),
            enable_duplicate_removal: std::env::var("ENABLE_DUPLICATE_REMOVAL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
            enable_exclusion_list: std::env::var("ENABLE_EXCLUSION_LIST")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
            enable_ai_filtering: std::env::var("ENABLE_AI_FILTERING")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
            exclusion_list,
            retry: defaults.retry,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be at least 1".to_string());
        }
        if self.ai_resize_width == 0 || self.ai_resize_height == 0 {
            return Err(format!(
                "AI resize target must be non-zero, got {}x{}",
                self.ai_resize_width, self.ai_resize_height
            ));
        }
        if self.phash_threshold > 256 {
            return Err(format!("phash_threshold {} exceeds hash width", self.phash_threshold));
        }
        Ok(())
    }

    /// Resize target for classification, or `None` when images go out as stored.
    pub fn ai_resize_target(&self) -> Option<(u32, u32)> {
        let (max_w, max_h) = AI_RESIZE_CEILING;
        (self.ai_resize_width < max_w || self.ai_resize_height < max_h)
            .then_some((self.ai_resize_width, self.ai_resize_height))
    }

    /// Exclusion entries that take part in matching.
    pub fn active_exclusions(&self) -> impl Iterator<Item = &ExclusionEntry> {
        self.exclusion_list.iter().filter(|e| e.is_active())
    }
}

/// Read a JSON array of exclusion entries.
pub fn load_exclusion_list(path: &Path) -> WorkerResult<Vec<ExclusionEntry>> {
    let content = std::fs::read_to_string(path)?;
    let entries: Vec<ExclusionEntry> = serde_json::from_str(&content)?;
    if entries.iter().any(|e| e.name.trim().is_empty()) {
        return Err(WorkerError::config_error("exclusion entries need a name"));
    }
    Ok(entries)
}
