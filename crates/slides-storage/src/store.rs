//! Slide files on the local filesystem.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use slides_media::{MediaError, MediaResult, SlideSink};
use slides_models::Slide;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Folder under the output root that holds trashed files.
pub const TRASH_DIR: &str = ".trash";
/// Manifest file name inside [`TRASH_DIR`].
pub const MANIFEST_FILE: &str = "trash-manifest.jsonl";

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Configuration for the slide store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory that holds one folder per extraction session
    pub output_root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("./slides"),
        }
    }
}

impl StoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            output_root: std::env::var("SLIDES_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| Self::default().output_root),
        }
    }
}

/// Reads and writes slide images under a single output root.
#[derive(Clone)]
pub struct SlideStore {
    root: PathBuf,
    /// Serializes manifest writes
    pub(crate) manifest_lock: Arc<Mutex<()>>,
}

impl SlideStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            manifest_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.output_root.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn trash_root(&self) -> PathBuf {
        self.root.join(TRASH_DIR)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.trash_root().join(MANIFEST_FILE)
    }

    /// Absolute path of a session folder.
    pub fn session_dir(&self, folder: &str) -> StorageResult<PathBuf> {
        validate_component(folder)?;
        Ok(self.root.join(folder))
    }

    /// Path of `path` relative to the root, rejecting anything that escapes it.
    pub(crate) fn relative_to_root(&self, path: &Path) -> StorageResult<PathBuf> {
        let rel = path
            .strip_prefix(&self.root)
            .map_err(|_| StorageError::outside_root(path.display().to_string()))?;
        let clean = rel.components().all(|c| matches!(c, Component::Normal(_)));
        if !clean || rel.as_os_str().is_empty() {
            return Err(StorageError::outside_root(path.display().to_string()));
        }
        if rel.starts_with(TRASH_DIR) {
            return Err(StorageError::outside_root(format!(
                "{} is already in the trash",
                path.display()
            )));
        }
        Ok(rel.to_path_buf())
    }

    /// Write encoded image bytes into a session folder.
    pub async fn write_slide(&self, folder: &str, filename: &str, bytes: &[u8]) -> StorageResult<PathBuf> {
        validate_component(filename)?;
        let dir = self.session_dir(folder)?;
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(filename);
        tokio::fs::write(&path, bytes).await?;
        info!(path = %path.display(), bytes = bytes.len(), "Wrote slide");
        Ok(path)
    }

    /// Read an image and return it base64 encoded.
    pub async fn read_slide_base64(&self, path: &Path) -> StorageResult<String> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| StorageError::from_io(e, path))?;
        debug!(path = %path.display(), bytes = bytes.len(), "Read slide");
        Ok(STANDARD.encode(bytes))
    }

    /// Image files directly inside `dir`, in natural order.
    pub async fn list_slide_files(&self, dir: &Path) -> StorageResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| StorageError::from_io(e, dir))?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_image = Path::new(&name)
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if is_image {
                files.push(name);
            }
        }

        files.sort_by(|a, b| natural_key(a).cmp(&natural_key(b)));
        Ok(files)
    }
}

fn validate_component(name: &str) -> StorageResult<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if name != TRASH_DIR => Ok(()),
        _ => Err(StorageError::invalid_name(name)),
    }
}

/// Sort key that orders "Slide 2" before "Slide 10".
fn natural_key(name: &str) -> (String, u64, String) {
    let start = name.find(|c: char| c.is_ascii_digit());
    match start {
        Some(start) => {
            let digits: String = name[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
            let rest = &name[start + digits.len()..];
            (
                name[..start].to_string(),
                digits.parse().unwrap_or(u64::MAX),
                rest.to_string(),
            )
        }
        None => (name.to_string(), 0, String::new()),
    }
}

/// Writes a detector session's slides into one folder.
#[derive(Clone)]
pub struct SessionWriter {
    store: SlideStore,
    folder: String,
}

impl SessionWriter {
    pub fn new(store: SlideStore, folder: impl Into<String>) -> Self {
        Self {
            store,
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }
}

#[async_trait]
impl SlideSink for SessionWriter {
    async fn write_slide(&self, slide: &Slide) -> MediaResult<()> {
        self.store
            .write_slide(&self.folder, slide.filename(), &slide.encoded)
            .await
            .map(|_| ())
            .map_err(|e| MediaError::storage(e.to_string()))
    }
}
