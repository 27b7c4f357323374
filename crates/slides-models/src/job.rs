//! Post-processing job definitions.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a post-processing job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new job ID of the form `pp_{unix_ms}_{suffix}`.
    pub fn new() -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("pp_{}_{}", Utc::now().timestamp_millis(), &suffix[..9]))
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the queue
    #[default]
    Queued,
    /// Currently being processed
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Terminal jobs are never mutated again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Queued or processing.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which phase a job is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingPhase {
    #[default]
    Idle,
    Hashing,
    Duplicates,
    Exclusion,
    Classification,
    Completed,
}

impl ProcessingPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingPhase::Idle => "idle",
            ProcessingPhase::Hashing => "hashing",
            ProcessingPhase::Duplicates => "duplicates",
            ProcessingPhase::Exclusion => "exclusion",
            ProcessingPhase::Classification => "classification",
            ProcessingPhase::Completed => "completed",
        }
    }
}

/// Incremental progress of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub phase: ProcessingPhase,
    /// Position within the current phase (1-based once started)
    pub current_index: usize,
    /// Number of items the current phase walks over
    pub total_count: usize,
    pub duplicates_removed: usize,
    pub excluded_removed: usize,
    pub ai_filtered: usize,
    /// Files with a classification verdict
    pub completed: usize,
    /// Files that could not be classified
    pub failed: usize,
    /// Files in the batch currently in flight
    pub retrying: usize,
    pub duplicates_skipped: bool,
    pub exclusion_skipped: bool,
    pub classification_skipped: bool,
}

/// Error category recorded against a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorType {
    Network,
    #[serde(rename = "403")]
    Forbidden,
    #[serde(rename = "413")]
    PayloadTooLarge,
    #[serde(rename = "429")]
    RateLimited,
    Http,
    Unknown,
}

/// A per-file failure recorded on a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobError {
    /// `*` for failures that affect the whole job
    pub filename: String,
    pub error_type: JobErrorType,
    pub message: String,
    pub retry_count: u32,
}

/// A post-processing job over one extraction session's output.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostProcessJob {
    pub id: JobId,
    /// Extraction session that produced the images
    pub task_id: String,
    /// Directory holding the images
    pub output_path: String,
    /// File names relative to `output_path`; fixed at submission
    pub image_files: Vec<String>,
    pub status: JobStatus,
    pub progress: JobProgress,
    #[serde(default)]
    pub errors: Vec<JobError>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PostProcessJob {
    pub fn new(task_id: impl Into<String>, output_path: impl Into<String>, image_files: Vec<String>) -> Self {
        let total = image_files.len();
        Self {
            id: JobId::new(),
            task_id: task_id.into(),
            output_path: output_path.into(),
            image_files,
            status: JobStatus::Queued,
            progress: JobProgress {
                total_count: total,
                ..Default::default()
            },
            errors: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Mark the job as picked up by the executor.
    pub fn start(&mut self) {
        self.status = JobStatus::Processing;
        self.started_at = Some(Utc::now());
    }

    /// Move to a terminal status. Does nothing if already terminal.
    pub fn finish(&mut self, status: JobStatus) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        self.completed_at = Some(Utc::now());
        self.progress.phase = ProcessingPhase::Completed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_prefix() {
        let id = JobId::new();
        assert!(id.as_str().starts_with("pp_"));
    }

    #[test]
    fn test_new_job_is_queued_with_totals() {
        let job = PostProcessJob::new("task-1", "/out", vec!["a.png".into(), "b.png".into()]);
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress.total_count, 2);
        assert!(job.started_at.is_none());
    }

    #[test]
    fn test_finish_is_idempotent_once_terminal() {
        let mut job = PostProcessJob::new("task-1", "/out", vec![]);
        job.start();
        job.finish(JobStatus::Completed);
        let completed_at = job.completed_at;
        job.finish(JobStatus::Failed);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.completed_at, completed_at);
    }

    #[test]
    fn test_error_type_wire_names() {
        assert_eq!(serde_json::to_string(&JobErrorType::PayloadTooLarge).unwrap(), "\"413\"");
        assert_eq!(serde_json::to_string(&JobErrorType::Network).unwrap(), "\"network\"");
    }
}
