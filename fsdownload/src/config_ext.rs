//! Extension integrating download settings into fsconfig
//!
//! Keys live under `download`:
//!
//! ```yaml
//! download:
//!   max_concurrent_downloads: 3
//!   max_concurrent_ffmpeg: 2
//!   ffmpeg_path: ffmpeg
//!   codec: libmp3lame
//!   bitrate: 192k
//!   quality: "2"
//!   threads: "0"
//!   min_file_size: 10240
//!   request_delay_ms: 100
//!   zip_compression_level: 6
//!   item_timeout_secs: 600
//!   max_filename_length: 200
//! ```

use std::time::Duration;

use fsconfig::Config;

/// Download gate size
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 3;
/// Transcode gate size
pub const DEFAULT_MAX_CONCURRENT_FFMPEG: usize = 2;
/// Smallest encoder output accepted as audio
pub const MIN_FILE_SIZE: u64 = 10 * 1024;
/// Pause between archive batches
pub const REQUEST_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_ZIP_COMPRESSION_LEVEL: i64 = 6;
pub const DEFAULT_ITEM_TIMEOUT: Duration = Duration::from_secs(600);
pub const MAX_FILENAME_LENGTH: usize = 200;

/// Encoder settings
#[derive(Debug, Clone)]
pub struct EncoderSettings {
    pub ffmpeg_path: String,
    pub codec: String,
    pub bitrate: String,
    pub quality: String,
    pub threads: String,
    pub min_file_size: u64,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            codec: "libmp3lame".to_string(),
            bitrate: "192k".to_string(),
            quality: "2".to_string(),
            threads: "0".to_string(),
            min_file_size: MIN_FILE_SIZE,
        }
    }
}

/// Everything the pipeline needs from the configuration
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub max_concurrent_downloads: usize,
    pub max_concurrent_ffmpeg: usize,
    pub encoder: EncoderSettings,
    pub request_delay: Duration,
    pub zip_compression_level: i64,
    pub item_timeout: Duration,
    pub max_filename_length: usize,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            max_concurrent_ffmpeg: DEFAULT_MAX_CONCURRENT_FFMPEG,
            encoder: EncoderSettings::default(),
            request_delay: REQUEST_DELAY,
            zip_compression_level: DEFAULT_ZIP_COMPRESSION_LEVEL,
            item_timeout: DEFAULT_ITEM_TIMEOUT,
            max_filename_length: MAX_FILENAME_LENGTH,
        }
    }
}

/// Extension trait for download settings on `fsconfig::Config`
///
/// # Example
///
/// ```rust,ignore
/// use fsconfig::get_config;
/// use fsdownload::DownloadConfigExt;
///
/// let settings = get_config().get_download_settings();
/// assert!(settings.max_concurrent_ffmpeg <= settings.max_concurrent_downloads);
/// ```
pub trait DownloadConfigExt {
    fn get_max_concurrent_downloads(&self) -> usize;

    fn get_max_concurrent_ffmpeg(&self) -> usize;

    fn get_encoder_settings(&self) -> EncoderSettings;

    /// Per-item wall-clock budget
    fn get_item_timeout(&self) -> Duration;

    /// All download settings at once
    fn get_download_settings(&self) -> DownloadSettings;
}

impl DownloadConfigExt for Config {
    fn get_max_concurrent_downloads(&self) -> usize {
        let n = self.get_u64_or(
            &["download", "max_concurrent_downloads"],
            DEFAULT_MAX_CONCURRENT_DOWNLOADS as u64,
        );
        (n as usize).max(1)
    }

    fn get_max_concurrent_ffmpeg(&self) -> usize {
        let n = self.get_u64_or(
            &["download", "max_concurrent_ffmpeg"],
            DEFAULT_MAX_CONCURRENT_FFMPEG as u64,
        );
        (n as usize).max(1)
    }

    fn get_encoder_settings(&self) -> EncoderSettings {
        let defaults = EncoderSettings::default();
        EncoderSettings {
            ffmpeg_path: self.get_string_or(&["download", "ffmpeg_path"], &defaults.ffmpeg_path),
            codec: self.get_string_or(&["download", "codec"], &defaults.codec),
            bitrate: self.get_string_or(&["download", "bitrate"], &defaults.bitrate),
            quality: self.get_string_or(&["download", "quality"], &defaults.quality),
            threads: self.get_string_or(&["download", "threads"], &defaults.threads),
            min_file_size: self.get_u64_or(&["download", "min_file_size"], MIN_FILE_SIZE),
        }
    }

    fn get_item_timeout(&self) -> Duration {
        Duration::from_secs(self.get_u64_or(
            &["download", "item_timeout_secs"],
            DEFAULT_ITEM_TIMEOUT.as_secs(),
        ))
    }

    fn get_download_settings(&self) -> DownloadSettings {
        DownloadSettings {
            max_concurrent_downloads: self.get_max_concurrent_downloads(),
            max_concurrent_ffmpeg: self.get_max_concurrent_ffmpeg(),
            encoder: self.get_encoder_settings(),
            request_delay: Duration::from_millis(self.get_u64_or(
                &["download", "request_delay_ms"],
                REQUEST_DELAY.as_millis() as u64,
            )),
            zip_compression_level: self
                .get_u64_or(
                    &["download", "zip_compression_level"],
                    DEFAULT_ZIP_COMPRESSION_LEVEL as u64,
                )
                .min(9) as i64,
            item_timeout: self.get_item_timeout(),
            max_filename_length: self.get_u64_or(
                &["download", "max_filename_length"],
                MAX_FILENAME_LENGTH as u64,
            ) as usize,
        }
    }
}
