//! Proxy server lifecycle.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::ProxyConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::intranet::{IntranetMapper, NetworkStatus};
use crate::routes::create_router;
use crate::session::{self, LiveStream, PlaybackUrls, RecordedSession};
use crate::state::AppState;

/// A running proxy listener plus its token refresher.
pub struct ProxyServer {
    state: AppState,
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    server: Mutex<Option<JoinHandle<()>>>,
    refresher: Mutex<Option<JoinHandle<()>>>,
}

impl ProxyServer {
    /// Bind and serve with the HTTP token provider.
    pub async fn start(config: ProxyConfig) -> ProxyResult<Self> {
        config.validate().map_err(ProxyError::internal)?;
        Self::serve(AppState::new(config)?).await
    }

    /// Bind and serve prepared state.
    pub async fn serve(state: AppState) -> ProxyResult<Self> {
        let bind = format!("{}:{}", state.config.host, state.config.port);
        let listener = TcpListener::bind(&bind).await?;
        let addr = listener.local_addr()?;
        state.set_port(addr.port());

        let (shutdown, mut rx) = watch::channel(false);
        let app = create_router(state.clone());
        let server = tokio::spawn(async move {
            let signal = async move {
                let _ = rx.wait_for(|stop| *stop).await;
            };
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(signal).await {
                error!("Proxy server error: {}", e);
            }
        });

        info!(%addr, intranet = state.intranet.is_enabled(), "Video proxy listening");
        Ok(Self {
            state,
            addr,
            shutdown,
            server: Mutex::new(Some(server)),
            refresher: Mutex::new(None),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn intranet(&self) -> &Arc<IntranetMapper> {
        &self.state.intranet
    }

    pub fn network_status(&self) -> NetworkStatus {
        self.state.intranet.network_status()
    }

    /// Proxy URLs for a recorded session. Starts token refreshing.
    pub fn playback_urls(&self, session: &RecordedSession, login_token: &str) -> PlaybackUrls {
        self.activate(login_token);
        session::playback_urls(self.port(), session, login_token)
    }

    /// Live stream URLs, proxied only in intranet mode.
    pub fn live_urls(&self, stream: &LiveStream, login_token: &str) -> PlaybackUrls {
        self.state.tokens.set_login_token(login_token);
        session::live_urls(
            self.port(),
            self.state.intranet.is_enabled(),
            stream,
            login_token,
        )
    }

    fn activate(&self, login_token: &str) {
        self.state.tokens.set_login_token(login_token);
        if *self.shutdown.borrow() {
            return;
        }

        let mut refresher = self.refresher.lock().unwrap();
        if refresher.as_ref().map_or(true, |h| h.is_finished()) {
            *refresher = Some(
                self.state
                    .tokens
                    .spawn_refresher(self.state.config.refresh_interval, self.shutdown.subscribe()),
            );
        }
    }

    /// Stop the refresher and close the listener.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let handles = [
            self.refresher.lock().unwrap().take(),
            self.server.lock().unwrap().take(),
        ];
        for handle in handles.into_iter().flatten() {
            let _ = handle.await;
        }
        info!(addr = %self.addr, "Video proxy stopped");
    }
}

impl Drop for ProxyServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::tests::StaticProvider;
    use std::time::Duration;

    async fn server() -> ProxyServer {
        let state = AppState::with_provider(ProxyConfig::default(), Arc::new(StaticProvider::default())).unwrap();
        ProxyServer::serve(state).await.unwrap()
    }

    #[tokio::test]
    async fn test_binds_ephemeral_port_and_serves_health() {
        let server = server().await;
        assert_ne!(server.port(), 0);
        assert_eq!(server.state().port(), server.port());

        let response = reqwest::get(format!("http://127.0.0.1:{}/health", server.port()))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_playback_urls_start_refresher() {
        let server = server().await;
        let session = RecordedSession {
            title: "L1".into(),
            main_url: Some("https://cvideo.example/a.m3u8".into()),
            ..Default::default()
        };

        let urls = server.playback_urls(&session, "login1");
        assert!(urls.streams["main"]
            .url
            .starts_with(&format!("http://localhost:{}/?originalUrl=", server.port())));

        let populated = tokio::time::timeout(Duration::from_secs(5), async {
            while server.state().tokens.snapshot().is_none() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(populated.is_ok());

        server.stop().await;
    }

    #[tokio::test]
    async fn test_stop_closes_listener() {
        let server = server().await;
        let port = server.port();
        server.stop().await;

        let result = reqwest::get(format!("http://127.0.0.1:{}/health", port)).await;
        assert!(result.is_err());
    }
}
