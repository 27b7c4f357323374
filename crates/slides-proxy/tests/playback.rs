//! Player-side flow against a live proxy listener.

use std::sync::Arc;

use async_trait::async_trait;
use slides_proxy::signing::path_hash;
use slides_proxy::{AppState, ProxyConfig, ProxyResult, ProxyServer, RecordedSession, VideoTokenProvider};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct FixedToken;

#[async_trait]
impl VideoTokenProvider for FixedToken {
    async fn video_token(&self, _login_token: &str) -> ProxyResult<String> {
        Ok("vt-fixed".to_string())
    }
}

#[tokio::test]
async fn test_player_follows_rewritten_playlist() {
    let cdn = MockServer::start().await;
    let hash = path_hash();
    Mock::given(method("GET"))
        .and(path(format!("/rec/{}/index.m3u8", hash).as_str()))
        .and(query_param("Xvideo_Token", "vt-fixed"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:10,\npart-0.ts\n#EXT-X-ENDLIST\n",
        ))
        .mount(&cdn)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/rec/{}/part-0.ts", hash).as_str()))
        .and(query_param("Xvideo_Token", "vt-fixed"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0x47u8; 188])
                .insert_header("content-type", "video/mp2t"),
        )
        .mount(&cdn)
        .await;

    let state = AppState::with_provider(ProxyConfig::default(), Arc::new(FixedToken)).unwrap();
    let server = ProxyServer::serve(state).await.unwrap();

    let session = RecordedSession {
        session_id: Some("s-1".into()),
        title: "Lecture".into(),
        main_url: Some(format!("{}/rec/index.m3u8", cdn.uri())),
        ..Default::default()
    };
    let urls = server.playback_urls(&session, "login-abc");
    let playlist_url = urls.streams["main"].url.clone();

    let playlist = reqwest::get(&playlist_url).await.unwrap();
    assert_eq!(playlist.status(), 200);
    assert_eq!(
        playlist.headers()["content-type"],
        "application/vnd.apple.mpegurl"
    );
    let body = playlist.text().await.unwrap();
    let segment_url = body
        .lines()
        .find(|l| l.starts_with("http://localhost:"))
        .unwrap()
        .to_string();

    let segment = reqwest::get(&segment_url).await.unwrap();
    assert_eq!(segment.status(), 200);
    assert_eq!(segment.headers()["content-type"], "video/mp2t");
    assert_eq!(segment.headers()["access-control-allow-origin"], "*");
    assert_eq!(segment.bytes().await.unwrap().len(), 188);

    server.stop().await;
}
