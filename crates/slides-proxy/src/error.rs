//! Proxy error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

pub type ProxyResult<T> = Result<T, ProxyError>;

/// Errors surfaced by the proxy. Every variant maps to a plain-text response.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Missing required parameters")]
    MissingParameters,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Upstream answered with a non-success status below 500.
    #[error("{message}")]
    UpstreamStatus { status: StatusCode, message: String },

    #[error("Proxy error: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Proxy error: video token unavailable: {0}")]
    Token(String),

    #[error("Proxy error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProxyError {
    pub fn invalid_url(msg: impl Into<String>) -> Self {
        Self::InvalidUrl(msg.into())
    }

    pub fn token(msg: impl Into<String>) -> Self {
        Self::Token(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn upstream_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::UpstreamStatus {
            status,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::MissingParameters | ProxyError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            ProxyError::UpstreamStatus { status, .. } => *status,
            ProxyError::Upstream(_)
            | ProxyError::Token(_)
            | ProxyError::Internal(_)
            | ProxyError::Io(_)
            | ProxyError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}
