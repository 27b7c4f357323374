//! Video token and signature cache.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::{ProxyError, ProxyResult};
use crate::metrics;
use crate::signing::{self, Signature};

/// Exchanges a login token for a video token.
#[async_trait]
pub trait VideoTokenProvider: Send + Sync {
    async fn video_token(&self, login_token: &str) -> ProxyResult<String>;
}

/// Fetches video tokens from the campus API.
pub struct HttpVideoTokenProvider {
    http: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct TokenEnvelope {
    #[serde(default)]
    code: serde_json::Value,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<TokenData>,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    token: String,
}

impl HttpVideoTokenProvider {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl VideoTokenProvider for HttpVideoTokenProvider {
    async fn video_token(&self, login_token: &str) -> ProxyResult<String> {
        let timestamp = Utc::now().timestamp().to_string();
        let response = self
            .http
            .get(&self.endpoint)
            .header("Origin", crate::upstream::ORIGIN)
            .header("Referer", crate::upstream::REFERER)
            .header("User-Agent", crate::upstream::USER_AGENT)
            .header("Xdomain-Client", "web_user")
            .header("Xclient-Version", "v1")
            .header(
                "Xclient-Signature",
                format!("{:x}", md5::compute(format!("{}_v1_undefined", signing::MAGIC))),
            )
            .header("Xclient-Timestamp", timestamp)
            .bearer_auth(login_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProxyError::token(format!("token endpoint returned {}", status)));
        }

        let envelope: TokenEnvelope = response.json().await?;
        let ok = match &envelope.code {
            serde_json::Value::Number(n) => n.as_i64() == Some(0),
            serde_json::Value::String(s) => s == "0",
            _ => false,
        };
        match envelope.data {
            Some(data) if ok && !data.token.is_empty() => Ok(data.token),
            _ => Err(ProxyError::token(
                envelope.message.unwrap_or_else(|| format!("rejected with code {}", envelope.code)),
            )),
        }
    }
}

/// Signing state shared by all requests between two refreshes.
#[derive(Debug, Clone)]
pub struct TokenSnapshot {
    pub video_token: String,
    pub signature: Signature,
    pub refreshed_at: DateTime<Utc>,
}

/// Caches the video token and keeps the signature fresh.
///
/// Readers take an `Arc` of the latest snapshot; refreshes replace it whole.
pub struct TokenCache {
    provider: Arc<dyn VideoTokenProvider>,
    login_token: RwLock<Option<String>>,
    /// (login token, video token) of the last successful fetch
    video_token: Mutex<Option<(String, String)>>,
    snapshot: RwLock<Option<Arc<TokenSnapshot>>>,
}

impl TokenCache {
    pub fn new(provider: Arc<dyn VideoTokenProvider>) -> Self {
        Self {
            provider,
            login_token: RwLock::new(None),
            video_token: Mutex::new(None),
            snapshot: RwLock::new(None),
        }
    }

    /// Remember the login token used for video token requests.
    ///
    /// A different token invalidates the current snapshot.
    pub fn set_login_token(&self, token: &str) {
        let mut current = self.login_token.write().unwrap();
        if current.as_deref() == Some(token) {
            return;
        }
        *current = Some(token.to_string());
        *self.snapshot.write().unwrap() = None;
        debug!("Login token changed, signing snapshot cleared");
    }

    pub fn login_token(&self) -> Option<String> {
        self.login_token.read().unwrap().clone()
    }

    pub fn snapshot(&self) -> Option<Arc<TokenSnapshot>> {
        self.snapshot.read().unwrap().clone()
    }

    /// Latest snapshot, populating it on first use.
    pub async fn current(&self) -> ProxyResult<Arc<TokenSnapshot>> {
        if let Some(snapshot) = self.snapshot() {
            return Ok(snapshot);
        }
        self.refresh().await
    }

    /// Build a new snapshot with a fresh signature.
    ///
    /// The video token is fetched only once per login token.
    pub async fn refresh(&self) -> ProxyResult<Arc<TokenSnapshot>> {
        let login = self
            .login_token()
            .ok_or_else(|| ProxyError::token("no login token"))?;

        let video_token = {
            let mut cached = self.video_token.lock().await;
            match cached.as_ref() {
                Some((for_login, token)) if *for_login == login => token.clone(),
                _ => {
                    let token = match self.provider.video_token(&login).await {
                        Ok(token) => token,
                        Err(e) => {
                            metrics::record_token_refresh(false);
                            return Err(e);
                        }
                    };
                    info!("Fetched video token");
                    *cached = Some((login.clone(), token.clone()));
                    token
                }
            }
        };

        let snapshot = Arc::new(TokenSnapshot {
            video_token,
            signature: Signature::now(),
            refreshed_at: Utc::now(),
        });
        // a login change during the fetch wins over this result
        if self.login_token().as_deref() == Some(login.as_str()) {
            *self.snapshot.write().unwrap() = Some(Arc::clone(&snapshot));
        }
        metrics::record_token_refresh(true);
        debug!(timestamp = snapshot.signature.timestamp, "Signing snapshot refreshed");
        Ok(snapshot)
    }

    /// Refresh on a fixed interval until `shutdown` turns true.
    pub fn spawn_refresher(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = cache.refresh().await {
                            warn!("Token refresh failed: {}", e);
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Token refresher stopped");
        })
    }
}
