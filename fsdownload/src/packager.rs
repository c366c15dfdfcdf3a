//! Collection packaging
//!
//! Every track of a collection gets its own task, admitted by the download
//! gate. Results are consumed as they complete, put back in collection
//! order by [`OrderedReassembly`], and appended to a ZIP archive whose
//! bytes are streamed as soon as they are written.
//!
//! Dropping the stream cancels the tasks still running.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use fssoundcloud::ResolvedItem;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::archive::{compress_entry, CompressedEntry, SharedArchive};
use crate::assembler::AssembleItem;
use crate::config_ext::DownloadSettings;
use crate::error::{DownloadError, Result};
use crate::filename::entry_filename;
use crate::reassembly::OrderedReassembly;

/// A compressed track waiting for its turn in the archive
#[derive(Debug)]
struct PreparedEntry {
    name: String,
    data: CompressedEntry,
}

/// Builds streamed ZIP archives out of collections
pub struct Packager<A> {
    assembler: Arc<A>,
    gate: Arc<Semaphore>,
    batch_size: usize,
    request_delay: Duration,
    compression_level: i64,
    max_filename_length: usize,
}

impl<A> Clone for Packager<A> {
    fn clone(&self) -> Self {
        Self {
            assembler: self.assembler.clone(),
            gate: self.gate.clone(),
            batch_size: self.batch_size,
            request_delay: self.request_delay,
            compression_level: self.compression_level,
            max_filename_length: self.max_filename_length,
        }
    }
}

impl<A: AssembleItem + 'static> Packager<A> {
    pub fn new(assembler: Arc<A>, settings: &DownloadSettings) -> Self {
        let batch_size = settings.max_concurrent_downloads.max(1);
        Self {
            assembler,
            gate: Arc::new(Semaphore::new(batch_size)),
            batch_size,
            request_delay: settings.request_delay,
            compression_level: settings.zip_compression_level,
            max_filename_length: settings.max_filename_length,
        }
    }

    /// Streams the ZIP archive of `tracks`, entries in the given order
    ///
    /// Failed tracks are left out. When none succeeds the stream yields
    /// [`DownloadError::NoItemsSucceeded`] and no bytes.
    pub fn package(
        &self,
        tracks: Vec<ResolvedItem>,
        attach_metadata: bool,
    ) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
        let this = self.clone();

        async_stream::try_stream! {
            let cancel = CancellationToken::new();
            let _cancel_on_drop = cancel.clone().drop_guard();

            let archive = SharedArchive::new(this.max_filename_length)?;
            let total = tracks.len();
            info!("Packaging {} tracks", total);

            let mut running = FuturesUnordered::new();
            for (index, item) in tracks.into_iter().enumerate() {
                let task = tokio::spawn(this.clone().prepare_entry(
                    index,
                    total,
                    item,
                    attach_metadata,
                    cancel.child_token(),
                ));
                running.push(async move { (index, task.await) });
            }

            let mut order = OrderedReassembly::new();
            while let Some((index, joined)) = running.next().await {
                let entry = match joined {
                    Ok(result) => result?,
                    Err(e) => {
                        warn!("Track {}/{} task failed: {}", index + 1, total, e);
                        None
                    }
                };
                order.complete(index, entry);

                while let Some((index, ready)) = order.next_ready() {
                    if let Some(entry) = ready {
                        debug!("Adding track {}/{} as {}", index + 1, total, entry.name);
                        let chunk = archive.append(entry.name, entry.data).await?;
                        if !chunk.is_empty() {
                            yield chunk;
                        }
                    }

                    if order.next_index() % this.batch_size == 0 {
                        tokio::time::sleep(this.request_delay).await;
                    }
                }
            }

            let written = archive.entries().await;
            if written == 0 {
                Err(DownloadError::NoItemsSucceeded)?;
            }

            let tail = archive.finish().await?;
            info!("Archive complete: {}/{} tracks", written, total);
            yield tail;
        }
    }

    /// Assembles and compresses one track
    ///
    /// Returns `None` when the track is skipped or the packaging was
    /// cancelled.
    async fn prepare_entry(
        self,
        index: usize,
        total: usize,
        item: ResolvedItem,
        attach_metadata: bool,
        cancel: CancellationToken,
    ) -> Result<Option<PreparedEntry>> {
        let _permit = tokio::select! {
            permit = self.gate.clone().acquire_owned() => permit
                .map_err(|_| DownloadError::Archive("download gate closed".into()))?,
            _ = cancel.cancelled() => return Ok(None),
        };

        tokio::select! {
            result = self.assemble_entry(index, total, &item, attach_metadata) => result,
            _ = cancel.cancelled() => {
                debug!("Track {}/{} cancelled", index + 1, total);
                Ok(None)
            }
        }
    }

    async fn assemble_entry(
        &self,
        index: usize,
        total: usize,
        item: &ResolvedItem,
        attach_metadata: bool,
    ) -> Result<Option<PreparedEntry>> {
        let Some(audio) = self
            .assembler
            .assemble_for_collection(item, attach_metadata, index, total)
            .await?
        else {
            return Ok(None);
        };

        let name = entry_filename(
            &audio.metadata.title,
            &audio.metadata.artist,
            self.max_filename_length,
        );
        let level = self.compression_level;
        let data =
            tokio::task::spawn_blocking(move || compress_entry(&audio.bytes, level)).await??;

        Ok(Some(PreparedEntry { name, data }))
    }
}
