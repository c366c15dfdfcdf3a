//! Transcoding and assembly against a stub encoder and a mock upstream
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fsdownload::{AssembleItem, Assembler, DownloadError, EncoderSettings, Transcoder};
use fssoundcloud::SoundCloudClient;
use futures::StreamExt;
use id3::TagLike;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CLIENT_ID: &str = "abcdefghijklmnopqrstuvwxyz012345";

/// Writes an executable ffmpeg stand-in
///
/// The last argument is the output: `-` means stdout.
fn stub_encoder(dir: &TempDir, output_bytes: usize, stderr: &str, exit_code: i32) -> PathBuf {
    let script = format!(
        "#!/bin/sh\n\
         if [ \"$1\" = \"-version\" ]; then echo 'ffmpeg version stub'; exit 0; fi\n\
         for last in \"$@\"; do :; done\n\
         if [ \"$last\" = \"-\" ]; then head -c {n} /dev/zero; else head -c {n} /dev/zero > \"$last\"; fi\n\
         printf '%s' '{stderr}' >&2\n\
         exit {code}\n",
        n = output_bytes,
        stderr = stderr,
        code = exit_code,
    );
    let path = dir.path().join("ffmpeg");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn transcoder(encoder: &Path) -> Transcoder {
    let settings = EncoderSettings {
        ffmpeg_path: encoder.to_string_lossy().into_owned(),
        ..EncoderSettings::default()
    };
    Transcoder::new(settings, 2, reqwest::Client::new())
}

#[tokio::test]
async fn test_small_output_is_a_transcode_failure() {
    let dir = TempDir::new().unwrap();
    let encoder = stub_encoder(&dir, 100, "", 0);
    let output = dir.path().join("out.mp3");

    let err = transcoder(&encoder)
        .transcode_to_file("https://cdn.example/playlist.m3u8", &output)
        .await
        .unwrap_err();
    assert!(matches!(err, DownloadError::TranscodeError(_)), "{err:?}");
}

#[tokio::test]
async fn test_large_enough_output_succeeds() {
    let dir = TempDir::new().unwrap();
    let encoder = stub_encoder(&dir, 20_000, "", 0);
    let output = dir.path().join("out.mp3");

    transcoder(&encoder)
        .transcode_to_file("https://cdn.example/playlist.m3u8", &output)
        .await
        .unwrap();
    assert_eq!(std::fs::metadata(&output).unwrap().len(), 20_000);
}

#[tokio::test]
async fn test_drm_in_stderr_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("#EXTM3U"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let encoder = stub_encoder(&dir, 0, "Error: cenc scheme not supported", 1);
    let output = dir.path().join("out.mp3");

    let err = transcoder(&encoder)
        .transcode_to_file(&format!("{}/playlist.m3u8", server.uri()), &output)
        .await
        .unwrap_err();
    assert!(err.is_drm());
    server.verify().await;
}

#[tokio::test]
async fn test_failed_run_retries_once_with_downloaded_manifest() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/playlist.m3u8"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let encoder = stub_encoder(&dir, 0, "Server returned 403 Forbidden", 1);
    let output = dir.path().join("out.mp3");

    let err = transcoder(&encoder)
        .transcode_to_file(&format!("{}/playlist.m3u8", server.uri()), &output)
        .await
        .unwrap_err();
    match err {
        DownloadError::TranscodeError(summary) => {
            assert_eq!(summary, "Server returned 403 Forbidden")
        }
        other => panic!("expected TranscodeError, got {other:?}"),
    }
    server.verify().await;
}

#[tokio::test]
async fn test_retry_against_local_manifest_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/playlist.m3u8"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("#EXTM3U\n#EXTINF:10.0,\nseg1.mp3\n"),
        )
        .expect(1)
        .mount(&server)
        .await;

    // Refuses remote inputs, copies the local manifest next to the output
    let dir = TempDir::new().unwrap();
    let encoder = dir.path().join("ffmpeg");
    std::fs::write(
        &encoder,
        "#!/bin/sh\n\
         prev=''\n\
         for arg in \"$@\"; do\n\
           if [ \"$prev\" = '-i' ]; then input=\"$arg\"; fi\n\
           prev=\"$arg\"; last=\"$arg\"\n\
         done\n\
         case \"$input\" in http*) printf 'Server returned 403 Forbidden' >&2; exit 1;; esac\n\
         cp \"$input\" \"$last.m3u8\"\n\
         head -c 20000 /dev/zero > \"$last\"\n",
    )
    .unwrap();
    std::fs::set_permissions(&encoder, std::fs::Permissions::from_mode(0o755)).unwrap();
    let output = dir.path().join("out.mp3");

    transcoder(&encoder)
        .transcode_to_file(&format!("{}/playlist.m3u8", server.uri()), &output)
        .await
        .unwrap();

    assert_eq!(std::fs::metadata(&output).unwrap().len(), 20_000);
    let manifest = std::fs::read_to_string(dir.path().join("out.mp3.m3u8")).unwrap();
    assert!(manifest.contains("seg1.mp3"));
    server.verify().await;
}

#[tokio::test]
async fn test_encoder_runs_never_exceed_the_transcode_gate() {
    let dir = TempDir::new().unwrap();
    let runs = dir.path().join("runs");
    std::fs::create_dir(&runs).unwrap();
    let counts = dir.path().join("counts");

    // Each run marks itself in `runs` and records how many runs are live
    let encoder = dir.path().join("ffmpeg");
    std::fs::write(
        &encoder,
        format!(
            "#!/bin/sh\n\
             for last in \"$@\"; do :; done\n\
             touch {runs}/$$\n\
             ls {runs} | wc -l >> {counts}\n\
             sleep 0.2\n\
             rm {runs}/$$\n\
             head -c 20000 /dev/zero > \"$last\"\n",
            runs = runs.display(),
            counts = counts.display(),
        ),
    )
    .unwrap();
    std::fs::set_permissions(&encoder, std::fs::Permissions::from_mode(0o755)).unwrap();

    let transcoder = transcoder(&encoder);
    let outputs: Vec<PathBuf> = (0..5).map(|i| dir.path().join(format!("{i}.mp3"))).collect();
    let jobs = outputs
        .iter()
        .map(|output| transcoder.transcode_to_file("https://cdn.example/p.m3u8", output));
    for result in futures::future::join_all(jobs).await {
        result.unwrap();
    }

    let counts: Vec<usize> = std::fs::read_to_string(&counts)
        .unwrap()
        .lines()
        .map(|l| l.trim().parse().unwrap())
        .collect();
    assert_eq!(counts.len(), 5);
    assert!(counts.iter().all(|&n| n <= 2), "live runs: {counts:?}");
    assert_eq!(transcoder.available_slots(), 2);
}

#[tokio::test]
async fn test_encrypted_manifest_body_is_drm() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/playlist.m3u8"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("#EXTM3U\n#EXT-X-KEY:METHOD=SAMPLE-AES,KEYFORMAT=\"cenc\"\n"),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let encoder = stub_encoder(&dir, 0, "Invalid data found", 1);
    let output = dir.path().join("out.mp3");

    let err = transcoder(&encoder)
        .transcode_to_file(&format!("{}/playlist.m3u8", server.uri()), &output)
        .await
        .unwrap_err();
    assert!(err.is_drm());
}

#[tokio::test]
async fn test_stream_mode_pipes_stdout() {
    let dir = TempDir::new().unwrap();
    let encoder = stub_encoder(&dir, 150_000, "", 0);

    let chunks: Vec<_> = transcoder(&encoder)
        .stream("https://cdn.example/playlist.m3u8".to_string())
        .collect()
        .await;
    let total: usize = chunks.iter().map(|c| c.as_ref().unwrap().len()).sum();
    assert_eq!(total, 150_000);
}

#[tokio::test]
async fn test_stream_mode_ends_with_error_on_failure() {
    let dir = TempDir::new().unwrap();
    let encoder = stub_encoder(&dir, 1_000, "broken pipe", 1);

    let chunks: Vec<_> = transcoder(&encoder)
        .stream("https://cdn.example/playlist.m3u8".to_string())
        .collect()
        .await;
    assert!(matches!(
        chunks.last(),
        Some(Err(DownloadError::TranscodeError(_)))
    ));
}

#[tokio::test]
async fn test_stream_mode_detects_drm_in_non_utf8_stderr() {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("ffmpeg");
    std::fs::write(
        &script,
        "#!/bin/sh\nprintf '\\377\\376 cenc key missing' >&2\nexit 1\n",
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let chunks: Vec<_> = transcoder(&script)
        .stream("https://cdn.example/playlist.m3u8".to_string())
        .collect()
        .await;
    assert!(matches!(chunks.last(), Some(Err(DownloadError::DrmProtected))));
}

#[tokio::test]
async fn test_encoder_probe() {
    let dir = TempDir::new().unwrap();
    let encoder = stub_encoder(&dir, 0, "", 0);
    assert!(transcoder(&encoder).is_available().await);
}

#[tokio::test]
async fn test_single_track_is_transcoded_and_tagged() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tracks"))
        .and(query_param("ids", "13158665"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 13158665}])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/resolve"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "track",
            "id": 42,
            "title": "Song",
            "user": {"username": "Band"},
            "genre": "Ambient Drone",
            "release_title": "Record",
            "track_authorization": "AUTH",
            "media": {"transcodings": [{
                "url": format!("{}/media/soundcloud:tracks:42/abc/stream/hls", server.uri()),
                "format": {"protocol": "hls", "mime_type": "audio/mpeg"}
            }]}
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/media/soundcloud:tracks:42/abc/stream/hls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"url": format!("{}/hls/42/playlist.m3u8", server.uri())}),
        ))
        .mount(&server)
        .await;

    let client = SoundCloudClient::builder()
        .api_base(server.uri())
        .site_base(server.uri())
        .client_id(Some(CLIENT_ID.to_string()))
        .fallback_ids(Vec::new())
        .build()
        .unwrap();

    let dir = TempDir::new().unwrap();
    let encoder = stub_encoder(&dir, 20_000, "", 0);
    let assembler = Assembler::new(client.clone(), transcoder(&encoder), Duration::from_secs(30));

    let item = client
        .resolve("https://soundcloud.com/band/song")
        .await
        .unwrap();
    let audio = assembler.assemble(&item, true, 1).await.unwrap();

    assert!(audio.bytes.len() >= 20_000);
    assert_eq!(audio.metadata.title, "Song");

    let tagged = dir.path().join("tagged.mp3");
    std::fs::write(&tagged, &audio.bytes).unwrap();
    let tag = id3::Tag::read_from_path(&tagged).unwrap();
    assert_eq!(tag.title(), Some("Song"));
    assert_eq!(tag.artist(), Some("Band"));
    assert_eq!(tag.album(), Some("Record"));
    assert_eq!(tag.genre(), Some("Ambient"));
    assert_eq!(tag.track(), Some(1));
}

#[tokio::test]
async fn test_item_timeout() {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("ffmpeg");
    std::fs::write(&script, "#!/bin/sh\nsleep 5\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tracks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/media/soundcloud:tracks:7/abc/stream/hls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"url": format!("{}/hls/7/playlist.m3u8", server.uri())}),
        ))
        .mount(&server)
        .await;

    let client = SoundCloudClient::builder()
        .api_base(server.uri())
        .site_base(server.uri())
        .client_id(Some(CLIENT_ID.to_string()))
        .fallback_ids(Vec::new())
        .build()
        .unwrap();

    let track: fssoundcloud::Track = serde_json::from_value(json!({
        "id": 7,
        "title": "Slow",
        "media": {"transcodings": [{
            "url": format!("{}/media/soundcloud:tracks:7/abc/stream/hls", server.uri()),
            "format": {"protocol": "hls"}
        }]}
    }))
    .unwrap();
    let item = fssoundcloud::ResolvedItem::from_track(track);

    let assembler = Assembler::new(client, transcoder(&script), Duration::from_millis(300));
    let err = assembler.assemble(&item, false, 1).await.unwrap_err();
    assert!(matches!(err, DownloadError::Timeout(_)), "{err:?}");

    // Skipped inside a collection
    let skipped = assembler
        .assemble_for_collection(&item, false, 0, 3)
        .await
        .unwrap();
    assert!(skipped.is_none());
}
