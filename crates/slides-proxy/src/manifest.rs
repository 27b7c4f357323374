//! HLS playlist rewriting and segment URL resolution.

use url::{Position, Url};

use crate::error::{ProxyError, ProxyResult};

/// Which proxy route a playlist's segments go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamRoute {
    /// Signed on-demand recordings
    Recorded,
    /// Unsigned live streams
    Live,
}

impl StreamRoute {
    fn prefix(self) -> &'static str {
        match self {
            StreamRoute::Recorded => "",
            StreamRoute::Live => "live/",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamRoute::Recorded => "recorded",
            StreamRoute::Live => "live",
        }
    }
}

/// Point every media line of a playlist at the local proxy.
///
/// Tags and blank lines pass through unchanged. `base_url` is the unsigned
/// playlist URL; segment requests resolve against it.
pub fn rewrite_manifest(content: &str, port: u16, base_url: &str, route: StreamRoute) -> String {
    let base = urlencoding::encode(base_url);
    content
        .split('\n')
        .map(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                line.to_string()
            } else {
                format!(
                    "http://localhost:{}/{}{}?baseUrl={}",
                    port,
                    route.prefix(),
                    trimmed,
                    base
                )
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Resolve a segment reference against its playlist URL.
///
/// Absolute `http…` references are kept, `/`-rooted ones resolve at the
/// playlist's host, anything else is relative to the playlist's directory.
pub fn resolve_url(base_url: &str, segment: &str) -> ProxyResult<String> {
    if segment.starts_with("http") {
        return Ok(segment.to_string());
    }

    let base = Url::parse(base_url).map_err(|e| ProxyError::invalid_url(format!("{}: {}", base_url, e)))?;
    if segment.starts_with('/') {
        return Ok(format!("{}{}", &base[..Position::BeforePath], segment));
    }

    let path = base.path();
    let dir = match path.rfind('/') {
        Some(idx) => &path[..=idx],
        None => "/",
    };
    Ok(format!("{}{}{}", &base[..Position::BeforePath], dir, segment))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYLIST: &str = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:10.0,\nseg-0.ts\n\n#EXTINF:10.0,\n  seg-1.ts  \n#EXT-X-ENDLIST";

    #[test]
    fn test_recorded_rewrite() {
        let out = rewrite_manifest(PLAYLIST, 4321, "https://cdn.example/v/a.m3u8", StreamRoute::Recorded);
        let lines: Vec<&str> = out.split('\n').collect();

        assert_eq!(lines.len(), 8);
        assert_eq!(lines[0], "#EXTM3U");
        assert_eq!(
            lines[3],
            "http://localhost:4321/seg-0.ts?baseUrl=https%3A%2F%2Fcdn.example%2Fv%2Fa.m3u8"
        );
        assert_eq!(lines[4], "");
        assert!(lines[6].starts_with("http://localhost:4321/seg-1.ts?"));
        assert_eq!(lines[7], "#EXT-X-ENDLIST");
    }

    #[test]
    fn test_live_rewrite_uses_live_route() {
        let out = rewrite_manifest("#EXTM3U\nchunk.ts", 80, "http://l/x.m3u8", StreamRoute::Live);
        assert!(out.ends_with("http://localhost:80/live/chunk.ts?baseUrl=http%3A%2F%2Fl%2Fx.m3u8"));
    }

    #[test]
    fn test_resolve_relative() {
        assert_eq!(
            resolve_url("https://cdn.example:8443/v/2024/a.m3u8?k=1", "seg-0.ts").unwrap(),
            "https://cdn.example:8443/v/2024/seg-0.ts"
        );
    }

    #[test]
    fn test_resolve_rooted() {
        assert_eq!(
            resolve_url("https://cdn.example/v/2024/a.m3u8", "/other/seg.ts").unwrap(),
            "https://cdn.example/other/seg.ts"
        );
    }

    #[test]
    fn test_resolve_absolute_kept() {
        assert_eq!(
            resolve_url("https://cdn.example/a.m3u8", "https://mirror.example/s.ts").unwrap(),
            "https://mirror.example/s.ts"
        );
    }

    #[test]
    fn test_resolve_bad_base() {
        assert!(matches!(
            resolve_url("not a url", "seg.ts"),
            Err(ProxyError::InvalidUrl(_))
        ));
    }
}
