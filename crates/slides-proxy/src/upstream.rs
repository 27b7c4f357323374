//! Requests to the video CDN.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::header;
use tracing::{debug, warn};
use url::{Position, Url};

use crate::error::{ProxyError, ProxyResult};
use crate::intranet::IntranetMapper;
use crate::metrics;

pub const ORIGIN: &str = "https://www.yanhekt.cn";
pub const REFERER: &str = "https://www.yanhekt.cn/";
pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/140.0.0.0 Safari/537.3";

/// HTTP access to the CDN, with intranet host remapping.
pub struct Upstream {
    http: reqwest::Client,
    /// Used in intranet mode, where hosts are raw IPs
    relaxed: reqwest::Client,
    intranet: Arc<IntranetMapper>,
}

impl Upstream {
    pub fn new(timeout: Duration, intranet: Arc<IntranetMapper>) -> ProxyResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let relaxed = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            http,
            relaxed,
            intranet,
        })
    }

    pub fn intranet(&self) -> &Arc<IntranetMapper> {
        &self.intranet
    }

    /// GET `url` with the platform's browser headers.
    ///
    /// A transport failure against a remapped IP quarantines that IP.
    /// Responses of any status are returned to the caller.
    pub async fn get(&self, url: &str, kind: &'static str) -> ProxyResult<reqwest::Response> {
        let parsed = Url::parse(url).map_err(|e| ProxyError::invalid_url(format!("{}: {}", url, e)))?;
        let remapped = self.intranet.rewrite_url(&parsed);
        let client = if self.intranet.is_enabled() {
            &self.relaxed
        } else {
            &self.http
        };

        let target = remapped.as_ref().map(|r| r.url.as_str()).unwrap_or(url);
        let mut request = client
            .get(target)
            .header(header::ORIGIN, ORIGIN)
            .header(header::REFERER, REFERER)
            .header(header::USER_AGENT, USER_AGENT);
        if remapped.is_some() {
            request = request.header(header::HOST, &parsed[Position::BeforeHost..Position::AfterPort]);
        }

        debug!(kind, url = target, "Fetching upstream");
        let start = Instant::now();
        match request.send().await {
            Ok(response) => {
                metrics::record_upstream_request(
                    kind,
                    response.status().as_u16(),
                    start.elapsed().as_secs_f64(),
                );
                Ok(response)
            }
            Err(e) => {
                metrics::record_upstream_failure(kind);
                warn!(kind, url = target, "Upstream request failed: {}", e);
                if let Some(r) = remapped {
                    self.intranet.mark_failed(&r.ip, &r.domain);
                }
                Err(ProxyError::Upstream(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slides_models::{IntranetMapping, IntranetMappings, LoadBalanceStrategy};
    use wiremock::matchers::{header as header_is, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_sends_browser_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.m3u8"))
            .and(header_is("origin", ORIGIN))
            .and(header_is("referer", REFERER))
            .respond_with(ResponseTemplate::new(200).set_body_string("#EXTM3U"))
            .mount(&server)
            .await;

        let intranet = Arc::new(IntranetMapper::new(false, IntranetMappings::new()));
        let upstream = Upstream::new(Duration::from_secs(5), intranet).unwrap();
        let response = upstream
            .get(&format!("{}/a.m3u8", server.uri()), "manifest")
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_remapped_host_keeps_original_host_header() {
        let server = MockServer::start().await;
        let port = server.address().port();
        Mock::given(method("GET"))
            .and(header_is("host", format!("media.campus:{}", port).as_str()))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let mut mappings = IntranetMappings::new();
        mappings.insert("media.campus".to_string(), IntranetMapping::single("127.0.0.1"));
        let intranet = Arc::new(IntranetMapper::new(true, mappings));
        let upstream = Upstream::new(Duration::from_secs(5), intranet).unwrap();

        let response = upstream
            .get(&format!("http://media.campus:{}/x.ts", port), "segment")
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_transport_failure_quarantines_ip() {
        // reserve a port, then close it so the connection is refused
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut mappings = IntranetMappings::new();
        mappings.insert(
            "media.campus".to_string(),
            IntranetMapping::load_balanced(["127.0.0.1", "127.0.0.2"], LoadBalanceStrategy::FirstAvailable),
        );
        let intranet = Arc::new(IntranetMapper::new(true, mappings));
        let upstream = Upstream::new(Duration::from_secs(5), Arc::clone(&intranet)).unwrap();

        let result = upstream
            .get(&format!("http://media.campus:{}/x.ts", port), "segment")
            .await;
        assert!(matches!(result, Err(ProxyError::Upstream(_))));
        assert_eq!(intranet.resolve_ip("media.campus").as_deref(), Some("127.0.0.2"));
    }
}
