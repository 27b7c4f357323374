//! Classification service HTTP client.

use std::collections::HashMap;
use std::sync::{LazyLock, RwLock};

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use slides_models::{PromptKind, Verdict};
use tracing::{debug, info, warn};

use crate::config::{ClassifierConfig, ServiceType, BUILTIN_FALLBACK_MODEL};
use crate::error::{MlError, MlResult};
use crate::rate_limit::RateLimiter;
use crate::types::{ChatMessage, ChatRequest, ChatResponse, ContentPart, ModelInfo};

const COPILOT_BASE_URL: &str = "https://api.githubcopilot.com";
const MAX_TOKENS: u32 = 100;

/// Resolved target of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

/// Classifies batches of base64 PNG images.
#[async_trait]
pub trait BatchClassifier: Send + Sync {
    /// Verdicts keyed `image_{i}` by input position. Keys may be missing.
    async fn classify_batch(&self, images: &[String]) -> MlResult<HashMap<String, Verdict>>;
}

/// Client for an OpenAI-compatible vision chat endpoint.
pub struct ClassificationClient {
    http: Client,
    config: ClassifierConfig,
    limiter: RateLimiter,
    token: RwLock<Option<String>>,
    builtin_model: RwLock<Option<String>>,
}

impl ClassificationClient {
    pub fn new(config: ClassifierConfig) -> MlResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(MlError::Network)?;
        let limiter = RateLimiter::new(config.effective_rate_limit());

        Ok(Self {
            http,
            config,
            limiter,
            token: RwLock::new(None),
            builtin_model: RwLock::new(None),
        })
    }

    /// Create from environment variables. `AI_TOKEN` seeds the login token.
    pub fn from_env() -> MlResult<Self> {
        let client = Self::new(ClassifierConfig::from_env())?;
        if let Ok(token) = std::env::var("AI_TOKEN") {
            client.set_token(Some(token));
        }
        Ok(client)
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn rate_limit(&self) -> usize {
        self.limiter.limit()
    }

    /// Set the login token used by the hosted service.
    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap() = token;
        *self.builtin_model.write().unwrap() = None;
    }

    pub fn is_configured(&self) -> bool {
        let token = self.token.read().unwrap().clone();
        self.config.is_configured(token.as_deref())
    }

    /// Ask the hosted service which model to use.
    pub async fn builtin_model(&self) -> MlResult<String> {
        if let Some(model) = self.builtin_model.read().unwrap().clone() {
            return Ok(model);
        }

        let token = self.require_token()?;
        let url = format!("{}/model", self.config.builtin_base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .timeout(self.config.model_lookup_timeout)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if is_cloudflare_challenge(&body) {
            warn!("Model lookup answered with a Cloudflare challenge");
            return Err(MlError::CloudflareBlocked);
        }
        if !status.is_success() {
            return Err(MlError::from_http_status(status.as_u16(), body));
        }

        let model = serde_json::from_str::<ModelInfo>(&body)
            .ok()
            .and_then(|info| info.model)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| BUILTIN_FALLBACK_MODEL.to_string());

        info!(model = %model, "Resolved built-in classification model");
        *self.builtin_model.write().unwrap() = Some(model.clone());
        Ok(model)
    }

    fn require_token(&self) -> MlResult<String> {
        self.token
            .read()
            .unwrap()
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| MlError::not_configured("login token required for the built-in service"))
    }

    /// Base URL, key and model for the configured service.
    pub async fn endpoint(&self) -> MlResult<Endpoint> {
        match self.config.service_type {
            ServiceType::Builtin => {
                let model = self.builtin_model().await?;
                Ok(Endpoint {
                    base_url: self.config.builtin_base_url.clone(),
                    api_key: self.require_token()?,
                    model,
                })
            }
            ServiceType::Custom => {
                if !self.config.is_configured(None) {
                    return Err(MlError::not_configured(
                        "custom service needs a base URL, API key and model",
                    ));
                }
                Ok(Endpoint {
                    base_url: self.config.custom_base_url.trim_end_matches('/').to_string(),
                    api_key: self.config.custom_api_key.clone(),
                    model: self.config.custom_model.clone(),
                })
            }
        }
    }

    /// Classify one frame from a live stream.
    pub async fn classify_single(&self, image: &str) -> MlResult<Verdict> {
        let endpoint = self.endpoint().await?;
        let prompt = self.config.prompts.get(PromptKind::Live).to_string();
        let content = self
            .complete(&endpoint, prompt, std::slice::from_ref(&image.to_string()))
            .await?;
        parse_single(&content)
    }

    /// Classify recorded slides in one request.
    pub async fn classify_batch(&self, images: &[String]) -> MlResult<HashMap<String, Verdict>> {
        if images.is_empty() {
            return Ok(HashMap::new());
        }
        let endpoint = self.endpoint().await?;
        let prompt = self.config.prompts.get(PromptKind::Recorded).to_string();
        let content = self.complete(&endpoint, prompt, images).await?;
        let verdicts = parse_batch(&content)?;
        debug!(images = images.len(), verdicts = verdicts.len(), "Batch classified");
        Ok(verdicts)
    }

    /// Send one chat completion and return the first choice's text.
    async fn complete(&self, endpoint: &Endpoint, prompt: String, images: &[String]) -> MlResult<String> {
        let mut content = Vec::with_capacity(images.len() + 1);
        content.push(ContentPart::text(prompt));
        content.extend(images.iter().map(|img| ContentPart::png(img)));
        let has_images = content.iter().any(ContentPart::is_image);

        let body = ChatRequest {
            model: endpoint.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content,
            }],
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
        };

        self.limiter.acquire().await;

        let url = format!("{}/chat/completions", endpoint.base_url);
        debug!(url = %url, model = %endpoint.model, images = images.len(), "Sending classification request");

        let mut request = self.http.post(&url).bearer_auth(&endpoint.api_key).json(&body);
        if needs_vision_header(&endpoint.base_url, has_images) {
            request = request.header("Copilot-Vision-Request", "true");
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if is_cloudflare_challenge(&text) {
            warn!(status = status.as_u16(), "Classification request hit a Cloudflare challenge");
            return Err(MlError::CloudflareBlocked);
        }
        if !status.is_success() {
            warn!(status = status.as_u16(), "Classification request failed");
            return Err(MlError::from_http_status(status.as_u16(), text));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| MlError::invalid_response(format!("malformed completion body: {}", e)))?;
        Ok(parsed.first_content().to_string())
    }
}

#[async_trait]
impl BatchClassifier for ClassificationClient {
    async fn classify_batch(&self, images: &[String]) -> MlResult<HashMap<String, Verdict>> {
        ClassificationClient::classify_batch(self, images).await
    }
}

fn needs_vision_header(base_url: &str, has_images: bool) -> bool {
    has_images && base_url == COPILOT_BASE_URL
}

/// HTML pages and Cloudflare interstitials instead of JSON.
pub fn is_cloudflare_challenge(body: &str) -> bool {
    ["<!DOCTYPE", "<html", "Just a moment", "cf-mitigated"]
        .iter()
        .any(|marker| body.contains(marker))
}

/// Outermost `{...}` span in a model reply.
static JSON_OBJECT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{[\s\S]*\}").unwrap());

fn json_object(content: &str) -> MlResult<serde_json::Value> {
    let raw = JSON_OBJECT
        .find(content)
        .ok_or_else(|| MlError::invalid_response(format!("no JSON object in: {}", content)))?;
    serde_json::from_str(raw.as_str())
        .map_err(|e| MlError::invalid_response(format!("unparseable JSON: {}", e)))
}

/// Read `{"classification": "slide" | "not_slide"}` out of a model answer.
pub fn parse_single(content: &str) -> MlResult<Verdict> {
    let value = json_object(content)?;
    value
        .get("classification")
        .and_then(|v| v.as_str())
        .and_then(Verdict::parse)
        .ok_or_else(|| MlError::invalid_response(format!("no classification in: {}", content)))
}

/// Read `{"image_0": "slide", ...}` out of a model answer, dropping unknown values.
pub fn parse_batch(content: &str) -> MlResult<HashMap<String, Verdict>> {
    let value = json_object(content)?;
    let verdicts: HashMap<String, Verdict> = value
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().and_then(Verdict::parse).map(|v| (k.clone(), v)))
                .collect()
        })
        .unwrap_or_default();

    if verdicts.is_empty() {
        return Err(MlError::invalid_response(format!(
            "no usable classifications in: {}",
            content
        )));
    }
    Ok(verdicts)
}
