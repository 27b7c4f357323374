//! Proxy metrics.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding process installs a recorder.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Metric names as constants for consistency.
pub mod names {
    // Local HTTP surface
    pub const HTTP_REQUESTS_TOTAL: &str = "slides_proxy_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "slides_proxy_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "slides_proxy_http_requests_in_flight";

    // Upstream CDN
    pub const UPSTREAM_REQUESTS_TOTAL: &str = "slides_proxy_upstream_requests_total";
    pub const UPSTREAM_REQUEST_DURATION_SECONDS: &str = "slides_proxy_upstream_request_duration_seconds";
    pub const UPSTREAM_FAILURES_TOTAL: &str = "slides_proxy_upstream_failures_total";

    // Signing and intranet
    pub const TOKEN_REFRESHES_TOTAL: &str = "slides_proxy_token_refreshes_total";
    pub const INTRANET_QUARANTINES_TOTAL: &str = "slides_proxy_intranet_quarantines_total";
}

/// Record a request served by the proxy.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("route", route_label(path).to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record an upstream response.
pub fn record_upstream_request(kind: &str, status: u16, duration_secs: f64) {
    let labels = [("kind", kind.to_string()), ("status", status.to_string())];
    counter!(names::UPSTREAM_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::UPSTREAM_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record an upstream transport failure.
pub fn record_upstream_failure(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!(names::UPSTREAM_FAILURES_TOTAL, &labels).increment(1);
}

pub fn record_token_refresh(success: bool) {
    let labels = [("result", if success { "ok" } else { "error" }.to_string())];
    counter!(names::TOKEN_REFRESHES_TOTAL, &labels).increment(1);
}

pub fn record_quarantine(domain: &str) {
    let labels = [("domain", domain.to_string())];
    counter!(names::INTRANET_QUARANTINES_TOTAL, &labels).increment(1);
}

/// Collapse segment paths into their route.
fn route_label(path: &str) -> &'static str {
    match path {
        "/" => "/",
        "/live" => "/live",
        "/health" => "/health",
        p if p.starts_with("/live/") => "/live/:segment",
        _ => "/:segment",
    }
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    record_http_request(&method, &path, status, start.elapsed().as_secs_f64());

    response
}
