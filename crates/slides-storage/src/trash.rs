//! Recoverable trash with a JSONL manifest.
//!
//! Trashed files keep their path relative to the output root, so
//! `<root>/lecture/Slide 3.png` lands at `<root>/.trash/lecture/Slide 3.png`
//! and restoring is a single rename back.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use slides_models::{TrashEntry, TrashReason};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::{StorageError, StorageResult};
use crate::store::SlideStore;

/// Outcome of a restore request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Entry IDs moved back to their original location
    pub restored: Vec<String>,
    /// Entry IDs that could not be restored, with the reason
    pub failed: Vec<(String, String)>,
}

impl SlideStore {
    /// Move a file under the root into the trash and record it.
    pub async fn move_to_trash(
        &self,
        path: &Path,
        reason: TrashReason,
        reason_details: Option<String>,
    ) -> StorageResult<TrashEntry> {
        let relative = self.relative_to_root(path)?;
        if !tokio::fs::try_exists(path).await? {
            return Err(StorageError::not_found(path.display().to_string()));
        }

        let trash_path = free_path(self.trash_root().join(&relative)).await?;
        if let Some(parent) = trash_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(path, &trash_path).await?;

        let filename = file_name(path);
        let parent_folder = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let entry = TrashEntry {
            id: TrashEntry::new_id(),
            filename,
            original_path: path.display().to_string(),
            original_parent_folder: parent_folder,
            trash_path: trash_path.display().to_string(),
            reason,
            reason_details,
            trashed_at: Utc::now(),
        };
        self.append_manifest(&entry).await?;

        info!(
            file = %entry.filename,
            reason = %entry.reason,
            details = entry.reason_details.as_deref().unwrap_or(""),
            "Moved to trash"
        );
        Ok(entry)
    }

    /// Trash a slide the user deleted by hand.
    pub async fn delete_slide(&self, path: &Path) -> StorageResult<TrashEntry> {
        self.move_to_trash(path, TrashReason::Manual, None).await
    }

    /// All entries currently in the manifest, oldest first.
    ///
    /// Malformed lines are skipped.
    pub async fn list_trash_manifest(&self) -> StorageResult<Vec<TrashEntry>> {
        let path = self.manifest_path();
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(parse_manifest(&content))
    }

    /// Move the given entries back to their original paths.
    ///
    /// Each entry is handled independently; restored entries leave the manifest.
    pub async fn restore_from_trash(&self, ids: &[String]) -> StorageResult<RestoreReport> {
        let _guard = self.manifest_lock.lock().await;
        let entries = self.list_trash_manifest().await?;
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();

        let mut report = RestoreReport::default();
        let mut restored_ids = HashSet::new();
        for entry in entries.iter().filter(|e| wanted.contains(e.id.as_str())) {
            match restore_entry(entry).await {
                Ok(()) => {
                    info!(file = %entry.filename, "Restored from trash");
                    restored_ids.insert(entry.id.clone());
                    report.restored.push(entry.id.clone());
                }
                Err(e) => {
                    warn!(file = %entry.filename, error = %e, "Restore failed");
                    report.failed.push((entry.id.clone(), e.to_string()));
                }
            }
        }

        let known: HashSet<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        for id in ids.iter().filter(|id| !known.contains(id.as_str())) {
            report
                .failed
                .push((id.clone(), StorageError::not_found(format!("trash entry {}", id)).to_string()));
        }

        if !restored_ids.is_empty() {
            let remaining: Vec<&TrashEntry> = entries
                .iter()
                .filter(|e| !restored_ids.contains(&e.id))
                .collect();
            self.rewrite_manifest(&remaining).await?;
        }
        Ok(report)
    }

    /// Permanently delete everything in the trash.
    pub async fn empty_trash(&self) -> StorageResult<usize> {
        let _guard = self.manifest_lock.lock().await;
        let count = self.list_trash_manifest().await?.len();
        match tokio::fs::remove_dir_all(self.trash_root()).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!(entries = count, "Emptied trash");
        Ok(count)
    }

    async fn append_manifest(&self, entry: &TrashEntry) -> StorageResult<()> {
        let _guard = self.manifest_lock.lock().await;
        tokio::fs::create_dir_all(self.trash_root()).await?;

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.manifest_path())
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Replace the manifest contents. Caller holds the manifest lock.
    async fn rewrite_manifest(&self, entries: &[&TrashEntry]) -> StorageResult<()> {
        let mut content = String::new();
        for entry in entries {
            content.push_str(&serde_json::to_string(entry)?);
            content.push('\n');
        }

        let tmp = self.trash_root().join(format!("{}.tmp", crate::store::MANIFEST_FILE));
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, self.manifest_path())
            .await
            .map_err(|e| StorageError::Manifest(e.to_string()))
    }
}

fn parse_manifest(content: &str) -> Vec<TrashEntry> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<TrashEntry>(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping malformed trash manifest line");
                None
            }
        })
        .collect()
}

async fn restore_entry(entry: &TrashEntry) -> StorageResult<()> {
    let from = PathBuf::from(&entry.trash_path);
    let to = PathBuf::from(&entry.original_path);

    if !tokio::fs::try_exists(&from).await? {
        return Err(StorageError::not_found(entry.trash_path.clone()));
    }
    if tokio::fs::try_exists(&to).await? {
        return Err(StorageError::already_exists(entry.original_path.clone()));
    }
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::rename(&from, &to).await?;
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `path`, or `name (n).ext` if something is already there.
async fn free_path(path: PathBuf) -> StorageResult<PathBuf> {
    if !tokio::fs::try_exists(&path).await? {
        return Ok(path);
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();

    let mut n = 1;
    loop {
        let candidate = parent.join(format!("{} ({}){}", stem, n, ext));
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
        n += 1;
    }
}
