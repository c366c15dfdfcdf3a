//! HLS to MP3 transcoding through an ffmpeg child process
//!
//! Every encoder run is admitted by a shared semaphore (the transcode gate)
//! and reported as a [`ProcessOutcome`]. Two modes are offered:
//!
//! - [`Transcoder::transcode_to_file`]: writes an MP3 file, validates its
//!   size and retries once with a locally downloaded manifest
//! - [`Transcoder::stream`]: pipes ffmpeg stdout as a byte stream, holding
//!   the gate slot until the stream ends or is dropped
//!
//! Children are spawned with `kill_on_drop`, so cancelling a transcode kills
//! the encoder.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use fssoundcloud::client::{DEFAULT_SITE_BASE, DEFAULT_USER_AGENT};
use fssoundcloud::{check_drm_in_content, is_drm_protected_url};
use reqwest::header::{ORIGIN, REFERER, USER_AGENT};
use reqwest::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::config_ext::EncoderSettings;
use crate::error::{DownloadError, Result};

/// Chunk size of the streaming mode
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Budget of the `ffmpeg -version` probe
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// How an encoder run failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessFailure {
    /// stderr mentioned encryption
    Drm,
    /// Non-zero exit, or killed by a signal when `None`
    Exit(Option<i32>),
}

/// Result of one encoder invocation
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub exit_code: Option<i32>,
    pub stderr: String,
    pub error: Option<ProcessFailure>,
}

impl ProcessOutcome {
    /// Classifies a finished run
    ///
    /// stderr is checked for DRM whatever the exit code.
    pub fn new(exit_code: Option<i32>, success: bool, stderr: String) -> Self {
        let error = if check_drm_in_content(&stderr).is_some() {
            Some(ProcessFailure::Drm)
        } else if !success {
            Some(ProcessFailure::Exit(exit_code))
        } else {
            None
        };
        Self {
            exit_code,
            stderr,
            error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_drm(&self) -> bool {
        self.error == Some(ProcessFailure::Drm)
    }

    /// First non-empty stderr line, or the exit code
    pub fn summary(&self) -> String {
        match self.stderr.lines().map(str::trim).find(|l| !l.is_empty()) {
            Some(line) => line.to_string(),
            None => match self.exit_code {
                Some(code) => format!("ffmpeg exited with code {}", code),
                None => "ffmpeg was terminated".to_string(),
            },
        }
    }

    /// Converts a failed outcome into the matching error
    pub fn into_result(self) -> Result<()> {
        match self.error {
            None => Ok(()),
            Some(ProcessFailure::Drm) => Err(DownloadError::DrmProtected),
            Some(ProcessFailure::Exit(_)) => Err(DownloadError::TranscodeError(self.summary())),
        }
    }
}

/// Supervised ffmpeg runner sharing one transcode gate
#[derive(Debug, Clone)]
pub struct Transcoder {
    settings: Arc<EncoderSettings>,
    gate: Arc<Semaphore>,
    http: reqwest::Client,
}

impl Transcoder {
    /// Creates a transcoder admitting `max_concurrent` encoders at once
    pub fn new(settings: EncoderSettings, max_concurrent: usize, http: reqwest::Client) -> Self {
        Self {
            settings: Arc::new(settings),
            gate: Arc::new(Semaphore::new(max_concurrent.max(1))),
            http,
        }
    }

    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    /// Free encoder slots
    pub fn available_slots(&self) -> usize {
        self.gate.available_permits()
    }

    fn input_args(&self, input: impl Into<OsString>) -> Vec<OsString> {
        let s = &self.settings;
        vec![
            "-threads".into(),
            s.threads.clone().into(),
            "-i".into(),
            input.into(),
            "-c:a".into(),
            s.codec.clone().into(),
            "-b:a".into(),
            s.bitrate.clone().into(),
            "-q:a".into(),
            s.quality.clone().into(),
        ]
    }

    /// Arguments writing `output`
    pub fn file_args(&self, input: impl Into<OsString>, output: &Path) -> Vec<OsString> {
        let mut args = self.input_args(input);
        args.extend([
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            output.as_os_str().to_owned(),
        ]);
        args
    }

    /// Arguments writing MP3 frames to stdout
    pub fn stdout_args(&self, input: impl Into<OsString>) -> Vec<OsString> {
        let mut args = self.input_args(input);
        args.extend(["-f".into(), "mp3".into(), "-loglevel".into(), "error".into(), "-".into()]);
        args
    }

    /// Runs ffmpeg to completion, capturing stderr
    async fn run(&self, args: Vec<OsString>) -> Result<ProcessOutcome> {
        debug!("Running {} {:?}", self.settings.ffmpeg_path, args);

        let output = Command::new(&self.settings.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DownloadError::TranscodeError(format!("Failed to start ffmpeg: {}", e)))?
            .wait_with_output()
            .await?;

        Ok(ProcessOutcome::new(
            output.status.code(),
            output.status.success(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ))
    }

    /// Transcodes the HLS manifest at `manifest` into an MP3 file
    ///
    /// A failed first run is retried once against a copy of the manifest
    /// fetched with browser headers. Output below the configured minimum
    /// size is rejected even when ffmpeg exits cleanly.
    pub async fn transcode_to_file(&self, manifest: &str, output: &Path) -> Result<()> {
        if is_drm_protected_url(manifest) {
            return Err(DownloadError::DrmProtected);
        }

        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| DownloadError::TranscodeError("transcode gate closed".into()))?;

        let outcome = self.run(self.file_args(manifest, output)).await?;
        match &outcome.error {
            None => {}
            Some(ProcessFailure::Drm) => {
                warn!("DRM detected in ffmpeg output");
                return Err(DownloadError::DrmProtected);
            }
            Some(ProcessFailure::Exit(code)) => {
                warn!(
                    "ffmpeg failed (exit {:?}): {}, retrying with manifest download",
                    code,
                    outcome.summary()
                );
                self.retry_with_manifest(manifest, output, &outcome).await?;
            }
        }

        let size = tokio::fs::metadata(output).await.map(|m| m.len()).unwrap_or(0);
        if size < self.settings.min_file_size {
            return Err(DownloadError::TranscodeError(format!(
                "Output file too small ({} bytes)",
                size
            )));
        }

        debug!("Transcoded {} bytes into {}", size, output.display());
        Ok(())
    }

    async fn retry_with_manifest(
        &self,
        manifest: &str,
        output: &Path,
        first: &ProcessOutcome,
    ) -> Result<()> {
        let response = self
            .http
            .get(manifest)
            .header(USER_AGENT, DEFAULT_USER_AGENT)
            .header(REFERER, format!("{}/", DEFAULT_SITE_BASE))
            .header(ORIGIN, DEFAULT_SITE_BASE)
            .send()
            .await
            .map_err(|e| {
                debug!("Manifest download failed: {}", e);
                DownloadError::TranscodeError(first.summary())
            })?;

        if response.status() != StatusCode::OK {
            debug!("Manifest download answered {}", response.status());
            return Err(DownloadError::TranscodeError(first.summary()));
        }

        let body = response.text().await?;
        if check_drm_in_content(&body).is_some() {
            return Err(DownloadError::DrmProtected);
        }

        let playlist = tempfile::Builder::new()
            .prefix("freesound-")
            .suffix(".m3u8")
            .tempfile()?;
        let mut file = tokio::fs::File::create(playlist.path()).await?;
        file.write_all(body.as_bytes()).await?;
        file.flush().await?;
        drop(file);

        let outcome = self.run(self.file_args(playlist.path(), output)).await?;
        outcome.into_result()
    }

    /// Streams the MP3 encoding of `manifest` from ffmpeg stdout
    ///
    /// The gate slot is taken when the stream is first polled and released
    /// when it ends or is dropped. A failed run ends the stream with an
    /// error item.
    pub fn stream(&self, manifest: String) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
        let this = self.clone();

        async_stream::try_stream! {
            if is_drm_protected_url(&manifest) {
                Err(DownloadError::DrmProtected)?;
            }

            let _permit = this
                .gate
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| DownloadError::TranscodeError("transcode gate closed".into()))?;

            let mut child = Command::new(&this.settings.ffmpeg_path)
                .args(this.stdout_args(manifest.as_str()))
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| DownloadError::TranscodeError(format!("Failed to start ffmpeg: {}", e)))?;

            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| DownloadError::TranscodeError("ffmpeg stdout unavailable".into()))?;
            let mut stderr = child
                .stderr
                .take()
                .ok_or_else(|| DownloadError::TranscodeError("ffmpeg stderr unavailable".into()))?;

            let stderr_task = tokio::spawn(async move {
                let mut captured = Vec::new();
                if let Err(e) = stderr.read_to_end(&mut captured).await {
                    debug!("Failed to read ffmpeg stderr: {}", e);
                }
                String::from_utf8_lossy(&captured).into_owned()
            });

            let mut chunks = ReaderStream::with_capacity(stdout, STREAM_CHUNK_SIZE);
            let mut sent = 0usize;
            while let Some(chunk) = chunks.next().await {
                let chunk = chunk.map_err(DownloadError::from)?;
                sent += chunk.len();
                yield chunk;
            }

            let status = child.wait().await.map_err(DownloadError::from)?;
            let stderr = stderr_task.await.unwrap_or_default();
            let outcome = ProcessOutcome::new(status.code(), status.success(), stderr);
            if !outcome.is_success() {
                warn!("ffmpeg stream failed after {} bytes: {}", sent, outcome.summary());
            }
            outcome.into_result()?;
            info!("Streamed {} bytes", sent);
        }
    }

    /// Whether `ffmpeg -version` runs within [`PROBE_TIMEOUT`]
    pub async fn is_available(&self) -> bool {
        let probe = Command::new(&self.settings.ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        match tokio::time::timeout(PROBE_TIMEOUT, probe).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                debug!("ffmpeg probe failed: {}", e);
                false
            }
            Err(_) => {
                debug!("ffmpeg probe timed out");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcoder() -> Transcoder {
        Transcoder::new(EncoderSettings::default(), 2, reqwest::Client::new())
    }

    #[test]
    fn test_file_args() {
        let args = transcoder().file_args("https://x/p.m3u8", Path::new("/tmp/out.mp3"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args.join(" "),
            "-threads 0 -i https://x/p.m3u8 -c:a libmp3lame -b:a 192k -q:a 2 -y -loglevel error /tmp/out.mp3"
        );
    }

    #[test]
    fn test_stdout_args() {
        let args = transcoder().stdout_args("in.m3u8");
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args.join(" "),
            "-threads 0 -i in.m3u8 -c:a libmp3lame -b:a 192k -q:a 2 -f mp3 -loglevel error -"
        );
    }

    #[test]
    fn test_outcome_scans_stderr_even_on_success() {
        let outcome = ProcessOutcome::new(Some(0), true, "Error: cenc encrypted stream".into());
        assert!(outcome.is_drm());
        assert!(matches!(outcome.into_result(), Err(DownloadError::DrmProtected)));
    }

    #[test]
    fn test_outcome_summary() {
        let outcome = ProcessOutcome::new(Some(1), false, "\n  first line\nsecond\n".into());
        assert_eq!(outcome.error, Some(ProcessFailure::Exit(Some(1))));
        assert_eq!(outcome.summary(), "first line");

        let outcome = ProcessOutcome::new(Some(3), false, String::new());
        assert_eq!(outcome.summary(), "ffmpeg exited with code 3");
    }

    #[tokio::test]
    async fn test_protected_manifest_is_refused_before_spawn() {
        let err = transcoder()
            .transcode_to_file("https://x/cenc/playlist.m3u8", Path::new("/nonexistent/out.mp3"))
            .await
            .unwrap_err();
        assert!(err.is_drm());
    }

    #[tokio::test]
    async fn test_missing_encoder_is_unavailable() {
        let settings = EncoderSettings {
            ffmpeg_path: "/nonexistent/ffmpeg".to_string(),
            ..EncoderSettings::default()
        };
        let transcoder = Transcoder::new(settings, 1, reqwest::Client::new());
        assert!(!transcoder.is_available().await);
    }
}
