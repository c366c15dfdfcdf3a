//! Download facade
//!
//! [`Downloader::download`] resolves a URL and picks the output shape:
//!
//! | Item | `attach_metadata` | Body |
//! |---|---|---|
//! | track | true | buffered, tagged MP3 |
//! | track | false | ffmpeg stdout stream |
//! | playlist / album | any | streamed ZIP archive |

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use fsconfig::get_config;
use fssoundcloud::{ItemInfo, ResolvedItem, SoundCloudClient, SoundCloudConfigExt};
use tracing::info;

use crate::assembler::{AssembleItem, Assembler};
use crate::config_ext::{DownloadConfigExt, DownloadSettings};
use crate::error::{DownloadError, Result};
use crate::filename::{archive_filename, track_filename};
use crate::packager::Packager;
use crate::transcoder::Transcoder;

pub const MP3_CONTENT_TYPE: &str = "audio/mpeg";
pub const ZIP_CONTENT_TYPE: &str = "application/zip";

/// Payload of a download
pub enum DownloadBody {
    /// Complete file in memory
    Buffered(Vec<u8>),
    /// Bytes produced while the client reads them
    Stream(BoxStream<'static, Result<Bytes>>),
}

impl std::fmt::Debug for DownloadBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffered(bytes) => write!(f, "Buffered({} bytes)", bytes.len()),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// A ready-to-send download
#[derive(Debug)]
pub struct Download {
    pub filename: String,
    pub content_type: &'static str,
    pub body: DownloadBody,
}

/// Entry point of the download pipeline
pub struct Downloader {
    client: SoundCloudClient,
    assembler: Arc<Assembler>,
    packager: Packager<Assembler>,
    settings: DownloadSettings,
}

impl Downloader {
    pub fn new(client: SoundCloudClient, settings: DownloadSettings) -> Self {
        let transcoder = Transcoder::new(
            settings.encoder.clone(),
            settings.max_concurrent_ffmpeg,
            client.http_client().clone(),
        );
        let assembler = Arc::new(Assembler::new(
            client.clone(),
            transcoder,
            settings.item_timeout,
        ));
        let packager = Packager::new(assembler.clone(), &settings);

        Self {
            client,
            assembler,
            packager,
            settings,
        }
    }

    /// Builds a downloader from the global configuration
    pub fn from_config() -> Result<Self> {
        let config = get_config();
        let client = config.soundcloud_client()?;
        Ok(Self::new(client, config.get_download_settings()))
    }

    pub fn client(&self) -> &SoundCloudClient {
        &self.client
    }

    pub fn settings(&self) -> &DownloadSettings {
        &self.settings
    }

    /// Whether the encoder can be run
    pub async fn ffmpeg_available(&self) -> bool {
        self.assembler.transcoder().is_available().await
    }

    /// Resolves `url` into its JSON view
    pub async fn info(&self, url: &str) -> Result<ItemInfo> {
        Ok(self.client.resolve(url).await?.info())
    }

    /// Downloads a track or a whole collection
    pub async fn download(&self, url: &str, format: &str, attach_metadata: bool) -> Result<Download> {
        if format != "mp3" {
            return Err(DownloadError::UnsupportedFormat(format.to_string()));
        }

        let item = self.client.resolve(url).await?;
        if item.is_collection() {
            self.download_collection(item, attach_metadata)
        } else {
            self.download_track(item, attach_metadata).await
        }
    }

    /// Single track, buffered when tagged, streamed otherwise
    pub async fn download_track(&self, item: ResolvedItem, attach_metadata: bool) -> Result<Download> {
        let filename = track_filename(&item.artist, &item.title, self.settings.max_filename_length);
        info!("Downloading track \"{}\"", filename);

        let body = if attach_metadata {
            let audio = self.assembler.assemble(&item, true, 1).await?;
            DownloadBody::Buffered(audio.bytes)
        } else {
            let track = self.assembler.ensure_full_track(&item).await?;
            let target = self.client.locate(&track).await?;
            DownloadBody::Stream(self.assembler.transcoder().stream(target.url).boxed())
        };

        Ok(Download {
            filename,
            content_type: MP3_CONTENT_TYPE,
            body,
        })
    }

    /// Playlist or album as a streamed ZIP archive
    pub fn download_collection(&self, item: ResolvedItem, attach_metadata: bool) -> Result<Download> {
        if item.children.is_empty() {
            return Err(DownloadError::ResolveError {
                status: None,
                message: "No tracks found in playlist/album".to_string(),
            });
        }

        let filename = archive_filename(&item.title, self.settings.max_filename_length);
        info!(
            "Downloading {} \"{}\" ({} tracks)",
            item.kind.as_str(),
            item.title,
            item.children.len()
        );

        let stream = self.packager.package(item.children, attach_metadata);
        Ok(Download {
            filename,
            content_type: ZIP_CONTENT_TYPE,
            body: DownloadBody::Stream(stream.boxed()),
        })
    }
}
