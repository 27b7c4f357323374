//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Executor stopped")]
    Stopped,

    #[error("Storage error: {0}")]
    Storage(#[from] slides_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] slides_media::MediaError),

    #[error("Classification error: {0}")]
    Classification(#[from] slides_ml_client::MlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether the failing operation could succeed if attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Classification(e) => e.is_retryable(),
            WorkerError::Io(_) => true,
            _ => false,
        }
    }
}
