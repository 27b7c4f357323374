//! Trash manifest entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a file was moved to the trash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrashReason {
    /// Near-identical to an earlier slide
    Duplicate,
    /// Matched an exclusion list entry
    Exclusion,
    /// Classified as not a slide
    AiFiltered,
    /// Deleted by the user
    Manual,
}

impl TrashReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrashReason::Duplicate => "duplicate",
            TrashReason::Exclusion => "exclusion",
            TrashReason::AiFiltered => "ai_filtered",
            TrashReason::Manual => "manual",
        }
    }
}

impl std::fmt::Display for TrashReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One line of the JSONL trash manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrashEntry {
    /// Never reused
    pub id: String,
    pub filename: String,
    /// Absolute path the file was moved from
    pub original_path: String,
    /// Name of the folder that held the file
    pub original_parent_folder: String,
    /// Absolute path under the `.trash` root
    pub trash_path: String,
    pub reason: TrashReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_details: Option<String>,
    pub trashed_at: DateTime<Utc>,
}

impl TrashEntry {
    /// Generate a fresh entry ID.
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }
}
