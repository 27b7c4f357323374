//! Router configuration.

use axum::middleware;
use axum::routing::get;
use axum::Router;

use crate::handlers;
use crate::metrics::metrics_middleware;
use crate::middleware::{cors, request_logging};
use crate::state::AppState;

/// Create the proxy router.
///
/// Segment requests fall through to the fallback so any path depth works.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::recorded_manifest))
        .route("/live", get(handlers::live_manifest))
        .route("/health", get(handlers::health))
        .fallback(handlers::segment)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_logging))
        .layer(middleware::from_fn(cors))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyConfig;
    use crate::signing::path_hash;
    use crate::token::tests::StaticProvider;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use std::sync::Arc;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PORT: u16 = 4000;

    fn state() -> AppState {
        let state = AppState::with_provider(ProxyConfig::default(), Arc::new(StaticProvider::default())).unwrap();
        state.set_port(PORT);
        state
    }

    async fn send(state: &AppState, uri: &str) -> Response {
        create_router(state.clone())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn enc(s: &str) -> String {
        urlencoding::encode(s).into_owned()
    }

    #[tokio::test]
    async fn test_preflight_answered() {
        let response = create_router(state())
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/seg.ts")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(headers["access-control-allow-methods"], "GET, POST, OPTIONS");
        assert_eq!(headers["access-control-allow-headers"], "Content-Type");
    }

    #[tokio::test]
    async fn test_missing_parameters() {
        let state = state();
        let response = send(&state, "/?originalUrl=http%3A%2F%2Fx%2Fa.m3u8").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(text(response).await, "Missing required parameters");

        let response = send(&state, "/seg-0.ts").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_recorded_manifest_signed_and_rewritten() {
        let server = MockServer::start().await;
        let hashed = format!("/v/{}/a.m3u8", path_hash());
        Mock::given(method("GET"))
            .and(path(hashed.as_str()))
            .and(query_param("Xvideo_Token", "video-login1"))
            .and(query_param("Xclient_Version", "v1"))
            .and(query_param("Platform", "yhkt_user"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("#EXTM3U\n#EXTINF:10,\nseg-0.ts\n#EXT-X-ENDLIST"),
            )
            .mount(&server)
            .await;

        let original = format!("{}/v/a.m3u8", server.uri());
        let state = state();
        let response = send(
            &state,
            &format!("/?originalUrl={}&loginToken=login1", enc(&original)),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "application/vnd.apple.mpegurl");
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        let body = text(response).await;
        let lines: Vec<&str> = body.split('\n').collect();
        assert_eq!(lines[0], "#EXTM3U");
        assert_eq!(
            lines[2],
            format!("http://localhost:{}/seg-0.ts?baseUrl={}", PORT, enc(&original))
        );
        assert_eq!(state.tokens.login_token().as_deref(), Some("login1"));
    }

    #[tokio::test]
    async fn test_manifest_client_error_relayed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let original = format!("{}/v/a.m3u8", server.uri());
        let response = send(
            &state(),
            &format!("/?originalUrl={}&loginToken=t", enc(&original)),
        )
        .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(text(response).await, "M3U8 request failed with status 404");
    }

    #[tokio::test]
    async fn test_manifest_server_error_becomes_500() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let original = format!("{}/live.m3u8", server.uri());
        let response = send(
            &state(),
            &format!("/live?originalUrl={}&loginToken=t", enc(&original)),
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(text(response).await.starts_with("Proxy error:"));
    }

    #[tokio::test]
    async fn test_live_manifest_unsigned() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/l/index.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string("#EXTM3U\nchunk-7.ts"))
            .mount(&server)
            .await;

        let original = format!("{}/l/index.m3u8", server.uri());
        let response = send(
            &state(),
            &format!("/live?originalUrl={}&loginToken=t", enc(&original)),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = text(response).await;
        assert!(body.contains(&format!("http://localhost:{}/live/chunk-7.ts?baseUrl=", PORT)));

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].url.query().is_none());
    }

    #[tokio::test]
    async fn test_recorded_segment_streamed_with_headers() {
        let server = MockServer::start().await;
        let hashed = format!("/v/{}/seg-0.ts", path_hash());
        Mock::given(method("GET"))
            .and(path(hashed.as_str()))
            .and(query_param("Xvideo_Token", "video-login1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-upstream", "cdn-3")
                    .insert_header("access-control-allow-origin", "https://www.yanhekt.cn")
                    .set_body_bytes(b"TSDATA".to_vec()),
            )
            .mount(&server)
            .await;

        let state = state();
        state.tokens.set_login_token("login1");
        let base = format!("{}/v/a.m3u8", server.uri());
        let response = send(&state, &format!("/seg-0.ts?baseUrl={}", enc(&base))).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-upstream"], "cdn-3");
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(text(response).await, "TSDATA");
    }

    #[tokio::test]
    async fn test_segment_status_relayed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .mount(&server)
            .await;

        let base = format!("{}/l/index.m3u8", server.uri());
        let response = send(&state(), &format!("/live/c.ts?baseUrl={}", enc(&base))).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(text(response).await, "denied");
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests[0].url.path(), "/l/c.ts");
    }

    #[tokio::test]
    async fn test_recorded_segment_without_login_fails() {
        let response = send(&state(), "/seg.ts?baseUrl=http%3A%2F%2Fh%2Fa.m3u8").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_health() {
        let response = send(&state(), "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&text(response).await).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["network"]["mode"], "internet");
    }
}
