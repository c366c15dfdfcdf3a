//! REST API routes against a mock upstream
#![cfg(feature = "server")]

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use fsdownload::api_rest::create_router;
use fsdownload::{DownloadSettings, Downloader, EncoderSettings};
use fssoundcloud::SoundCloudClient;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CLIENT_ID: &str = "abcdefghijklmnopqrstuvwxyz012345";

async fn downloader_for(server: &MockServer) -> Arc<Downloader> {
    Mock::given(method("GET"))
        .and(path("/tracks"))
        .and(query_param("ids", "13158665"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 13158665}])))
        .mount(server)
        .await;

    let client = SoundCloudClient::builder()
        .api_base(server.uri())
        .site_base(server.uri())
        .client_id(Some(CLIENT_ID.to_string()))
        .fallback_ids(Vec::new())
        .build()
        .unwrap();

    let settings = DownloadSettings {
        encoder: EncoderSettings {
            ffmpeg_path: "/nonexistent/ffmpeg".to_string(),
            ..EncoderSettings::default()
        },
        ..DownloadSettings::default()
    };
    Arc::new(Downloader::new(client, settings))
}

async fn call(downloader: Arc<Downloader>, request: Request<Body>) -> (StatusCode, Value) {
    let response = create_router(downloader).oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_root_and_health() {
    let server = MockServer::start().await;
    let downloader = downloader_for(&server).await;

    let (status, body) = call(downloader.clone(), get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "FreeSound API", "status": "running"}));

    let (status, body) = call(downloader, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "healthy", "ffmpeg_available": false}));
}

#[tokio::test]
async fn test_track_info() {
    let server = MockServer::start().await;
    let downloader = downloader_for(&server).await;

    Mock::given(method("GET"))
        .and(path("/resolve"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "track",
            "id": 5,
            "title": "Song",
            "duration": 61_500,
            "user": {"username": "Band"},
            "playback_count": 10
        })))
        .mount(&server)
        .await;

    let (status, body) = call(
        downloader,
        get("/track-info?url=https%3A%2F%2Fsoundcloud.com%2Fband%2Fsong"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "track");
    assert_eq!(body["title"], "Song");
    assert_eq!(body["artist"], "Band");
    assert_eq!(body["duration"], 61_500);
    assert_eq!(body["id"], 5);
}

#[tokio::test]
async fn test_track_info_failure_is_bad_request() {
    let server = MockServer::start().await;
    let downloader = downloader_for(&server).await;

    Mock::given(method("GET"))
        .and(path("/resolve"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let (status, body) = call(downloader, get("/track-info?url=https://soundcloud.com/x")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("404"));
}

#[tokio::test]
async fn test_download_rejects_other_formats() {
    let server = MockServer::start().await;
    let downloader = downloader_for(&server).await;

    let (status, body) = call(
        downloader,
        post("/download?url=https://soundcloud.com/x&format=flac"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("MP3"));
}

#[tokio::test]
async fn test_download_failure_is_summarized() {
    let server = MockServer::start().await;
    let downloader = downloader_for(&server).await;

    Mock::given(method("GET"))
        .and(path("/resolve"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "track",
            "id": 5,
            "title": "Song",
            "user": {"username": "Band"},
            "media": {"transcodings": [{
                "url": format!("{}/media/soundcloud:tracks:5/x/stream/hls/cenc", server.uri()),
                "format": {"protocol": "ctr-encrypted-hls"}
            }]}
        })))
        .mount(&server)
        .await;

    let (status, body) = call(downloader, post("/download?url=https://soundcloud.com/band/song")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .starts_with("Download failed: "));
}

#[tokio::test]
async fn test_empty_collection_download_fails() {
    let server = MockServer::start().await;
    let downloader = downloader_for(&server).await;

    Mock::given(method("GET"))
        .and(path("/resolve"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "playlist",
            "id": 9,
            "title": "Empty",
            "tracks": []
        })))
        .mount(&server)
        .await;

    let response = create_router(downloader)
        .oneshot(post("/download?url=https://soundcloud.com/band/sets/empty"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().get(header::CONTENT_DISPOSITION).is_none());
}
