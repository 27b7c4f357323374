//! HTTP handlers for playlists, segments and health.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderName, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProxyError, ProxyResult};
use crate::intranet::NetworkStatus;
use crate::manifest::{resolve_url, rewrite_manifest, StreamRoute};
use crate::signing::{encrypt_url, sign_url};
use crate::state::AppState;

const MPEGURL: &str = "application/vnd.apple.mpegurl";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestParams {
    pub original_url: Option<String>,
    pub login_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentParams {
    pub base_url: Option<String>,
}

fn required(value: Option<String>) -> ProxyResult<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(ProxyError::MissingParameters)
}

/// Signed recorded playlist.
pub async fn recorded_manifest(
    State(state): State<AppState>,
    Query(params): Query<ManifestParams>,
) -> ProxyResult<Response> {
    let original = required(params.original_url)?;
    let login = required(params.login_token)?;

    state.tokens.set_login_token(&login);
    let snapshot = state.tokens.current().await?;
    let signed = sign_url(&encrypt_url(&original), &snapshot.video_token, &snapshot.signature);

    let body = fetch_manifest(&state, &signed, "M3U8").await?;
    let rewritten = rewrite_manifest(&body, state.port(), &original, StreamRoute::Recorded);
    Ok(manifest_response(rewritten))
}

/// Unsigned live playlist.
pub async fn live_manifest(
    State(state): State<AppState>,
    Query(params): Query<ManifestParams>,
) -> ProxyResult<Response> {
    let original = required(params.original_url)?;
    let login = required(params.login_token)?;
    state.tokens.set_login_token(&login);

    let body = fetch_manifest(&state, &original, "Live M3U8").await?;
    let rewritten = rewrite_manifest(&body, state.port(), &original, StreamRoute::Live);
    Ok(manifest_response(rewritten))
}

async fn fetch_manifest(state: &AppState, url: &str, label: &str) -> ProxyResult<String> {
    let response = state.upstream.get(url, "manifest").await?;
    let status = response.status();
    if status.is_server_error() {
        return Err(ProxyError::internal(format!(
            "Request failed with status code {}",
            status.as_u16()
        )));
    }
    if status != StatusCode::OK {
        return Err(ProxyError::upstream_status(
            status,
            format!("{} request failed with status {}", label, status.as_u16()),
        ));
    }
    Ok(response.text().await?)
}

fn manifest_response(body: String) -> Response {
    ([(header::CONTENT_TYPE, MPEGURL)], body).into_response()
}

/// Headers the proxy never relays from upstream.
fn skip_header(name: &HeaderName) -> bool {
    name.as_str().starts_with("access-control-")
        || name == header::TRANSFER_ENCODING
        || name == header::CONNECTION
}

/// Media segment for either route, streamed through.
///
/// Mounted as the router fallback: `/live/{segment}` is unsigned, any other
/// path is a recorded segment.
pub async fn segment(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    Query(params): Query<SegmentParams>,
) -> ProxyResult<Response> {
    if method != Method::GET {
        return Ok(StatusCode::METHOD_NOT_ALLOWED.into_response());
    }

    let path = uri.path();
    let (route, name) = match path.strip_prefix("/live/") {
        Some(rest) => (StreamRoute::Live, rest),
        None => (StreamRoute::Recorded, path.trim_start_matches('/')),
    };
    if name.is_empty() {
        return Err(ProxyError::MissingParameters);
    }
    let base = required(params.base_url)?;
    let resolved = resolve_url(&base, name)?;

    let target = match route {
        StreamRoute::Recorded => {
            let snapshot = state.tokens.current().await?;
            sign_url(&encrypt_url(&resolved), &snapshot.video_token, &snapshot.signature)
        }
        StreamRoute::Live => resolved,
    };
    debug!(route = route.as_str(), segment = name, "Proxying segment");

    let upstream = state.upstream.get(&target, "segment").await?;
    let status = upstream.status();
    if status.is_server_error() {
        return Err(ProxyError::internal(format!(
            "Request failed with status code {}",
            status.as_u16()
        )));
    }

    let mut builder = axum::http::Response::builder().status(status);
    for (name, value) in upstream.headers() {
        if !skip_header(name) {
            builder = builder.header(name, value);
        }
    }
    builder
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| ProxyError::internal(e.to_string()))
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub network: NetworkStatus,
}

/// Liveness plus the current network mode.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        network: state.intranet.network_status(),
    })
}
