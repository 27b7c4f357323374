//! Player-facing stream URLs for recorded sessions and live streams.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Camera,
    Screen,
}

impl StreamType {
    pub fn display_name(self) -> &'static str {
        match self {
            StreamType::Camera => "Classroom camera",
            StreamType::Screen => "Screen recording",
        }
    }
}

/// One playable stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoStream {
    #[serde(rename = "type")]
    pub stream_type: StreamType,
    pub name: String,
    pub url: String,
    pub original_url: String,
}

impl VideoStream {
    fn new(stream_type: StreamType, url: String, original_url: String) -> Self {
        Self {
            stream_type,
            name: stream_type.display_name().to_string(),
            url,
            original_url,
        }
    }
}

/// Streams of one session, keyed `main`/`vga` or `camera`/`screen`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaybackUrls {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    pub streams: BTreeMap<String, VideoStream>,
}

/// A recorded lecture as returned by the course API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordedSession {
    #[serde(default, deserialize_with = "string_or_number")]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub video_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub duration: Option<String>,
    #[serde(default)]
    pub main_url: Option<String>,
    #[serde(default)]
    pub vga_url: Option<String>,
}

/// A live stream as returned by the course API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LiveStream {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub live_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub target_vga: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Undo JSON-escaped slashes left in upstream URLs.
pub fn fix_url_escaping(url: &str) -> String {
    url.replace("\\/", "/")
}

fn proxy_url(port: u16, route: &str, original: &str, login_token: &str) -> String {
    format!(
        "http://localhost:{}/{}?originalUrl={}&loginToken={}",
        port,
        route,
        urlencoding::encode(original),
        urlencoding::encode(login_token)
    )
}

/// Proxy URLs for a recorded session's camera and screen streams.
pub fn playback_urls(port: u16, session: &RecordedSession, login_token: &str) -> PlaybackUrls {
    let mut streams = BTreeMap::new();
    let sources = [
        ("main", StreamType::Camera, &session.main_url),
        ("vga", StreamType::Screen, &session.vga_url),
    ];
    for (key, stream_type, source) in sources {
        if let Some(source) = source.as_deref().filter(|s| !s.is_empty()) {
            let original = fix_url_escaping(source);
            let url = proxy_url(port, "", &original, login_token);
            streams.insert(key.to_string(), VideoStream::new(stream_type, url, original));
        }
    }

    PlaybackUrls {
        session_id: session.session_id.clone(),
        stream_id: None,
        video_id: session.video_id.clone(),
        title: session.title.clone(),
        duration: session.duration.clone(),
        streams,
    }
}

/// Live stream URLs: proxied in intranet mode, direct otherwise.
pub fn live_urls(port: u16, via_proxy: bool, stream: &LiveStream, login_token: &str) -> PlaybackUrls {
    let mut streams = BTreeMap::new();
    let sources = [
        ("camera", StreamType::Camera, &stream.target),
        ("screen", StreamType::Screen, &stream.target_vga),
    ];
    for (key, stream_type, source) in sources {
        if let Some(source) = source.as_deref().filter(|s| !s.is_empty()) {
            let original = fix_url_escaping(source);
            let url = if via_proxy {
                proxy_url(port, "live", &original, login_token)
            } else {
                original.clone()
            };
            streams.insert(key.to_string(), VideoStream::new(stream_type, url, original));
        }
    }

    PlaybackUrls {
        session_id: None,
        stream_id: stream.id.clone().or_else(|| stream.live_id.clone()),
        video_id: None,
        title: stream.title.clone(),
        duration: None,
        streams,
    }
}
