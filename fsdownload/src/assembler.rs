//! Item assembly: one resolved track to finished MP3 bytes
//!
//! locate → transcode into a private temp file → optional artwork and tags
//! → read back. The whole chain runs under the per-item timeout.

use std::time::Duration;

use async_trait::async_trait;
use fssoundcloud::{MediaKind, ResolvedItem, SoundCloudClient, SoundCloudError, Track};
use tracing::{debug, info, warn};

use crate::cover_art::fetch_cover_art;
use crate::error::{DownloadError, Result};
use crate::tagging::{tag_file, AudioMetadata};
use crate::transcoder::Transcoder;

/// Transcoded (and possibly tagged) audio of one track
#[derive(Debug, Clone)]
pub struct FinishedAudio {
    pub bytes: Vec<u8>,
    pub metadata: AudioMetadata,
}

/// Produces finished audio for a track
///
/// The collection wrapper turns skippable failures into `None`.
#[async_trait]
pub trait AssembleItem: Send + Sync {
    async fn assemble(
        &self,
        item: &ResolvedItem,
        attach_metadata: bool,
        track_number: u32,
    ) -> Result<FinishedAudio>;

    /// Assembles the `index`-th of `total` collection tracks
    async fn assemble_for_collection(
        &self,
        item: &ResolvedItem,
        attach_metadata: bool,
        index: usize,
        total: usize,
    ) -> Result<Option<FinishedAudio>> {
        match self.assemble(item, attach_metadata, index as u32 + 1).await {
            Ok(audio) => Ok(Some(audio)),
            Err(e) if e.is_drm() => {
                info!(
                    "Skipping track {}/{} ({}): DRM-protected",
                    index + 1,
                    total,
                    item.title
                );
                Ok(None)
            }
            Err(e) if e.is_skippable() => {
                warn!(
                    "Failed to download track {}/{} ({}): {}",
                    index + 1,
                    total,
                    item.title,
                    e
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Metadata written into the tags of `item`
pub fn metadata_for(item: &ResolvedItem, track_number: u32) -> AudioMetadata {
    AudioMetadata {
        title: item.title.clone(),
        artist: item.artist.clone(),
        album: item.album_title.clone(),
        genre: item.genre.clone(),
        track_number: Some(track_number),
        artwork: None,
    }
}

/// [`AssembleItem`] backed by SoundCloud and ffmpeg
#[derive(Debug, Clone)]
pub struct Assembler {
    client: SoundCloudClient,
    transcoder: Transcoder,
    item_timeout: Duration,
}

impl Assembler {
    pub fn new(client: SoundCloudClient, transcoder: Transcoder, item_timeout: Duration) -> Self {
        Self {
            client,
            transcoder,
            item_timeout,
        }
    }

    pub fn client(&self) -> &SoundCloudClient {
        &self.client
    }

    pub fn transcoder(&self) -> &Transcoder {
        &self.transcoder
    }

    /// Returns the track payload of `item`, resolving it again when the
    /// transcodings are missing
    pub async fn ensure_full_track(&self, item: &ResolvedItem) -> Result<Track> {
        if let Some(track) = item.track.as_ref().filter(|t| t.has_transcodings()) {
            return Ok(track.clone());
        }

        let reference = item
            .permalink_url
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| format!("{}/tracks/{}", self.client.site_base(), item.id));
        debug!("Resolving full payload of track {} from {}", item.id, reference);

        let resolved = self.client.resolve(&reference).await?;
        match (resolved.kind, resolved.track) {
            (MediaKind::Track, Some(track)) => Ok(track),
            _ => Err(SoundCloudError::no_stream("URL must be a track").into()),
        }
    }

    async fn assemble_inner(
        &self,
        item: &ResolvedItem,
        attach_metadata: bool,
        track_number: u32,
    ) -> Result<FinishedAudio> {
        let track = self.ensure_full_track(item).await?;
        let target = self.client.locate(&track).await?;

        let output = tempfile::Builder::new()
            .prefix("freesound-")
            .suffix(".mp3")
            .tempfile()?;
        self.transcoder
            .transcode_to_file(&target.url, output.path())
            .await?;

        let mut metadata = metadata_for(item, track_number);
        if attach_metadata {
            metadata.artwork =
                fetch_cover_art(self.client.http_client(), item.artwork_url.as_deref()).await;

            let path = output.path().to_path_buf();
            let tags = metadata.clone();
            tokio::task::spawn_blocking(move || tag_file(&path, &tags)).await??;
        }

        let bytes = tokio::fs::read(output.path()).await?;
        info!("Assembled \"{}\" ({} bytes)", item.title, bytes.len());
        Ok(FinishedAudio { bytes, metadata })
    }
}

#[async_trait]
impl AssembleItem for Assembler {
    async fn assemble(
        &self,
        item: &ResolvedItem,
        attach_metadata: bool,
        track_number: u32,
    ) -> Result<FinishedAudio> {
        tokio::time::timeout(
            self.item_timeout,
            self.assemble_inner(item, attach_metadata, track_number),
        )
        .await
        .map_err(|_| DownloadError::Timeout(self.item_timeout.as_secs()))?
    }
}
