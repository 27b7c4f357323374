//! Error types for similarity and detection.

use slides_models::ModelError;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while comparing, hashing or committing frames.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Image codec error: {0}")]
    Codec(#[from] image::ImageError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Similarity pool is closed")]
    PoolClosed,

    #[error("Slide storage failed: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    pub fn invalid_image(message: impl Into<String>) -> Self {
        Self::InvalidImage(message.into())
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
