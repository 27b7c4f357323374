//! Application state.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use crate::config::ProxyConfig;
use crate::error::ProxyResult;
use crate::intranet::IntranetMapper;
use crate::token::{HttpVideoTokenProvider, TokenCache, VideoTokenProvider};
use crate::upstream::Upstream;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub upstream: Arc<Upstream>,
    pub tokens: Arc<TokenCache>,
    pub intranet: Arc<IntranetMapper>,
    /// Listening port, known once bound
    port: Arc<AtomicU16>,
}

impl AppState {
    /// State backed by the HTTP video token endpoint.
    pub fn new(config: ProxyConfig) -> ProxyResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let provider = HttpVideoTokenProvider::new(http, config.video_token_url.clone());
        Self::with_provider(config, Arc::new(provider))
    }

    pub fn with_provider(
        config: ProxyConfig,
        provider: Arc<dyn VideoTokenProvider>,
    ) -> ProxyResult<Self> {
        let intranet = Arc::new(IntranetMapper::new(
            config.intranet_enabled,
            config.intranet_mappings(),
        ));
        let upstream = Upstream::new(config.request_timeout, Arc::clone(&intranet))?;

        Ok(Self {
            port: Arc::new(AtomicU16::new(config.port)),
            config: Arc::new(config),
            upstream: Arc::new(upstream),
            tokens: Arc::new(TokenCache::new(provider)),
            intranet,
        })
    }

    pub fn port(&self) -> u16 {
        self.port.load(Ordering::Relaxed)
    }

    pub fn set_port(&self, port: u16) {
        self.port.store(port, Ordering::Relaxed);
    }
}
