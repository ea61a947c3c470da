//! Integration tests for the progressive streaming endpoint.

mod common;

use common::TestHarness;

#[tokio::test]
async fn passthrough_serves_the_source_file() {
    let (h, addr) = TestHarness::with_server().await;
    let dir = tempfile::tempdir().unwrap();
    let contents: Vec<u8> = (0..=255u8).cycle().take(2048).collect();
    let (id, _) = h.add_media_file(dir.path(), "track.mp3", "mp3", &contents, Some(60));

    let resp = reqwest::get(format!("http://{addr}/stream?id={id}"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("content-type").unwrap().to_str().unwrap(),
        "audio/mpeg"
    );
    assert_eq!(
        resp.headers()
            .get("content-length")
            .unwrap()
            .to_str()
            .unwrap(),
        "2048"
    );
    assert_eq!(
        resp.headers()
            .get("accept-ranges")
            .unwrap()
            .to_str()
            .unwrap(),
        "bytes"
    );
    assert_eq!(resp.bytes().await.unwrap().as_ref(), &contents[..]);
}

#[tokio::test]
async fn passthrough_honors_range_requests() {
    let (h, addr) = TestHarness::with_server().await;
    let dir = tempfile::tempdir().unwrap();
    let contents: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
    let (id, _) = h.add_media_file(dir.path(), "track.mp3", "mp3", &contents, Some(60));

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("http://{addr}/stream?id={id}"))
        .header("range", "bytes=100-199")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 206);
    assert_eq!(
        resp.headers()
            .get("content-range")
            .unwrap()
            .to_str()
            .unwrap(),
        "bytes 100-199/1000"
    );
    assert_eq!(resp.bytes().await.unwrap().as_ref(), &contents[100..200]);
}

#[tokio::test]
async fn transcoded_stream_pipes_the_chain_output() {
    let (h, addr) = TestHarness::with_server().await;
    let dir = tempfile::tempdir().unwrap();
    let contents = b"flac-bytes-through-cat".to_vec();
    // The guest profile's flac→mp3 rule uses `cat %s`, so the "transcoded"
    // output equals the source bytes.
    let (id, _) = h.add_media_file(dir.path(), "track.flac", "flac", &contents, Some(60));

    let resp = reqwest::get(format!("http://{addr}/stream?id={id}&maxBitRate=128"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("content-type").unwrap().to_str().unwrap(),
        "audio/mpeg"
    );
    // (60 + 2) * 128 kbps * 1000 / 8 + 30000 bytes of padding.
    assert_eq!(
        resp.headers()
            .get("content-length")
            .unwrap()
            .to_str()
            .unwrap(),
        "1022000"
    );
    // `cat %s` carries no bitrate token, so ranges are not offered.
    assert!(resp.headers().get("accept-ranges").is_none());
    assert_eq!(resp.bytes().await.unwrap().as_ref(), &contents[..]);
}

#[tokio::test]
async fn raw_format_forces_passthrough() {
    let (h, addr) = TestHarness::with_server().await;
    let dir = tempfile::tempdir().unwrap();
    let contents = b"raw flac bytes".to_vec();
    let (id, _) = h.add_media_file(dir.path(), "track.flac", "flac", &contents, Some(60));

    let resp = reqwest::get(format!("http://{addr}/stream?id={id}&format=raw"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("content-type").unwrap().to_str().unwrap(),
        "audio/flac"
    );
    assert_eq!(
        resp.headers()
            .get("content-length")
            .unwrap()
            .to_str()
            .unwrap(),
        contents.len().to_string()
    );
}

#[tokio::test]
async fn unknown_media_is_not_found() {
    let (_h, addr) = TestHarness::with_server().await;
    let resp = reqwest::get(format!(
        "http://{addr}/stream?id=00000000-0000-0000-0000-000000000000"
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn health_endpoint_reports_sessions() {
    let (_h, addr) = TestHarness::with_server().await;
    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sessions"], 0);
}
