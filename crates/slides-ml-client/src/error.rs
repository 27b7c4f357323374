//! Classification client error types.

use slides_models::JobErrorType;
use thiserror::Error;

pub type MlResult<T> = Result<T, MlError>;

/// Coarse error category used by callers to pick a remediation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Forbidden,
    PayloadTooLarge,
    RateLimited,
    Http,
    Unknown,
}

impl ErrorKind {
    pub fn as_job_error_type(&self) -> JobErrorType {
        match self {
            ErrorKind::Network => JobErrorType::Network,
            ErrorKind::Forbidden => JobErrorType::Forbidden,
            ErrorKind::PayloadTooLarge => JobErrorType::PayloadTooLarge,
            ErrorKind::RateLimited => JobErrorType::RateLimited,
            ErrorKind::Http => JobErrorType::Http,
            ErrorKind::Unknown => JobErrorType::Unknown,
        }
    }
}

#[derive(Debug, Error)]
pub enum MlError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Forbidden (403): {0}")]
    Forbidden(String),

    #[error("Payload too large (413): {0}")]
    PayloadTooLarge(String),

    #[error("Rate limited (429): {0}")]
    RateLimited(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Request blocked by a Cloudflare challenge")]
    CloudflareBlocked,

    #[error("Classification service not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MlError {
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn not_configured(msg: impl Into<String>) -> Self {
        Self::NotConfigured(msg.into())
    }

    /// Map a non-success HTTP status and its body into the error taxonomy.
    pub fn from_http_status(status: u16, body: impl Into<String>) -> Self {
        let message = body.into();
        match status {
            403 => Self::Forbidden(message),
            413 => Self::PayloadTooLarge(message),
            429 => Self::RateLimited(message),
            _ => Self::Http { status, message },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MlError::Network(e) => match e.status().map(|s| s.as_u16()) {
                Some(403) => ErrorKind::Forbidden,
                Some(413) => ErrorKind::PayloadTooLarge,
                Some(429) => ErrorKind::RateLimited,
                Some(_) => ErrorKind::Http,
                None => ErrorKind::Network,
            },
            MlError::Forbidden(_) | MlError::CloudflareBlocked => ErrorKind::Forbidden,
            MlError::PayloadTooLarge(_) => ErrorKind::PayloadTooLarge,
            MlError::RateLimited(_) => ErrorKind::RateLimited,
            MlError::Http { .. } => ErrorKind::Http,
            MlError::NotConfigured(_) | MlError::InvalidResponse(_) | MlError::Json(_) => {
                ErrorKind::Unknown
            }
        }
    }

    /// Whether waiting and sending the same request again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Network | ErrorKind::Forbidden | ErrorKind::RateLimited
        )
    }
}
