//! Proxy configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use slides_models::{default_intranet_mappings, IntranetMappings};
use tracing::warn;

use crate::error::ProxyResult;

/// Default endpoint issuing video tokens for a login token.
pub const DEFAULT_VIDEO_TOKEN_URL: &str = "https://cbiz.yanhekt.cn/v1/auth/video/token?id=0";

/// Proxy server configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Bind host; the port is always chosen by the OS unless set
    pub host: String,
    /// 0 for an ephemeral port
    pub port: u16,
    /// How often the signing snapshot is renewed
    pub refresh_interval: Duration,
    /// Upstream request timeout
    pub request_timeout: Duration,
    /// Rewrite upstream hosts to campus IPs
    pub intranet_enabled: bool,
    /// JSON file of mappings merged over the built-in table
    pub intranet_mappings_file: Option<PathBuf>,
    pub video_token_url: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            refresh_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            intranet_enabled: false,
            intranet_mappings_file: None,
            video_token_url: DEFAULT_VIDEO_TOKEN_URL.to_string(),
        }
    }
}

impl ProxyConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("PROXY_HOST").unwrap_or(defaults.host),
            port: std::env::var("PROXY_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            refresh_interval: std::env::var("PROXY_REFRESH_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.refresh_interval),
            request_timeout: std::env::var("PROXY_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            intranet_enabled: std::env::var("INTRANET_MODE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            intranet_mappings_file: std::env::var("INTRANET_MAPPINGS_FILE").ok().map(PathBuf::from),
            video_token_url: std::env::var("VIDEO_TOKEN_URL").unwrap_or(defaults.video_token_url),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.refresh_interval.is_zero() {
            return Err("refresh interval must be positive".to_string());
        }
        if self.request_timeout.is_zero() {
            return Err("request timeout must be positive".to_string());
        }
        if url::Url::parse(&self.video_token_url).is_err() {
            return Err(format!("invalid video token URL: {}", self.video_token_url));
        }
        Ok(())
    }

    /// Built-in mappings with any configured overrides applied.
    ///
    /// An unreadable override file is logged and ignored.
    pub fn intranet_mappings(&self) -> IntranetMappings {
        let mut mappings = default_intranet_mappings();
        if let Some(path) = &self.intranet_mappings_file {
            match load_mapping_overrides(path) {
                Ok(overrides) => mappings.extend(overrides),
                Err(e) => warn!(path = %path.display(), "Ignoring intranet mapping overrides: {}", e),
            }
        }
        mappings
    }
}

/// Read a domain-to-mapping JSON object.
pub fn load_mapping_overrides(path: &Path) -> ProxyResult<IntranetMappings> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
