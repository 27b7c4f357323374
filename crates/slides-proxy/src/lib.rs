//! Local HLS proxy for the campus video platform.
//!
//! Signs recorded-lecture requests, rewrites playlists so every segment is
//! fetched through the proxy, and optionally remaps CDN hosts to campus
//! IPs with per-IP quarantine.

pub mod config;
pub mod error;
pub mod handlers;
pub mod intranet;
pub mod manifest;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod session;
pub mod signing;
pub mod state;
pub mod token;
pub mod upstream;

pub use config::ProxyConfig;
pub use error::{ProxyError, ProxyResult};
pub use intranet::{IntranetMapper, NetworkMode, NetworkStatus, QUARANTINE};
pub use manifest::{resolve_url, rewrite_manifest, StreamRoute};
pub use routes::create_router;
pub use server::ProxyServer;
pub use session::{fix_url_escaping, LiveStream, PlaybackUrls, RecordedSession, StreamType, VideoStream};
pub use signing::{encrypt_url, sign_url, Signature};
pub use state::AppState;
pub use token::{HttpVideoTokenProvider, TokenCache, TokenSnapshot, VideoTokenProvider};
