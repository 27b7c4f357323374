//! Classification client configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::prompts::PromptSet;

/// Base URL of the hosted classification service.
pub const BUILTIN_API_BASE_URL: &str = "https://openai.ruc.edu.kg";
/// Model used when the hosted service does not name one.
pub const BUILTIN_FALLBACK_MODEL: &str = "gpt-4.1";
/// Requests per minute for the hosted service.
pub const BUILTIN_RATE_LIMIT: usize = 10;
/// Requests per minute for a user-supplied endpoint.
pub const CUSTOM_RATE_LIMIT: usize = 60;

/// Which endpoint classification requests go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    /// Hosted service authenticated with the user's login token
    #[default]
    Builtin,
    /// Any OpenAI-compatible endpoint with its own key and model
    Custom,
}

impl std::str::FromStr for ServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "builtin" | "built-in" => Ok(ServiceType::Builtin),
            "custom" => Ok(ServiceType::Custom),
            other => Err(format!("unknown service type: {}", other)),
        }
    }
}

/// Configuration for [`crate::ClassificationClient`].
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub service_type: ServiceType,
    /// Overridable so tests can point at a local server
    pub builtin_base_url: String,
    pub custom_base_url: String,
    pub custom_api_key: String,
    pub custom_model: String,
    /// Requests per minute; `None` uses the service type's default
    pub rate_limit: Option<usize>,
    /// Timeout for chat completion requests
    pub timeout: Duration,
    /// Timeout for the hosted service's model lookup
    pub model_lookup_timeout: Duration,
    pub prompts: PromptSet,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            service_type: ServiceType::Builtin,
            builtin_base_url: BUILTIN_API_BASE_URL.to_string(),
            custom_base_url: String::new(),
            custom_api_key: String::new(),
            custom_model: String::new(),
            rate_limit: None,
            timeout: Duration::from_secs(30),
            model_lookup_timeout: Duration::from_secs(10),
            prompts: PromptSet::default(),
        }
    }
}

impl ClassifierConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let prompts = match std::env::var("AI_PROMPTS_FILE").ok().map(PathBuf::from) {
            Some(path) => PromptSet::from_file(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Ignoring prompt overrides");
                PromptSet::default()
            }),
            None => defaults.prompts.clone(),
        };

        Self {
            service_type: std::env::var("AI_SERVICE_TYPE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.service_type),
            builtin_base_url: std::env::var("AI_BUILTIN_BASE_URL")
                .unwrap_or(defaults.builtin_base_url),
            custom_base_url: std::env::var("AI_API_BASE_URL").unwrap_or_default(),
            custom_api_key: std::env::var("AI_API_KEY").unwrap_or_default(),
            custom_model: std::env::var("AI_MODEL").unwrap_or_default(),
            rate_limit: std::env::var("AI_RATE_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok()),
            timeout: Duration::from_secs(
                std::env::var("AI_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            model_lookup_timeout: defaults.model_lookup_timeout,
            prompts,
        }
    }

    /// Requests per minute actually enforced.
    pub fn effective_rate_limit(&self) -> usize {
        match (self.rate_limit, self.service_type) {
            (Some(limit), _) if limit > 0 => limit,
            (_, ServiceType::Builtin) => BUILTIN_RATE_LIMIT,
            (_, ServiceType::Custom) => CUSTOM_RATE_LIMIT,
        }
    }

    /// Whether enough settings are present to send a request.
    pub fn is_configured(&self, token: Option<&str>) -> bool {
        match self.service_type {
            ServiceType::Builtin => token.is_some_and(|t| !t.trim().is_empty()),
            ServiceType::Custom => {
                !self.custom_base_url.trim().is_empty()
                    && !self.custom_api_key.trim().is_empty()
                    && !self.custom_model.trim().is_empty()
            }
        }
    }
}
