//! # fsdownload - SoundCloud to MP3 download pipeline
//!
//! Turns resolved SoundCloud items into MP3 files and streamed ZIP
//! archives.
//!
//! ## Pipeline
//!
//! ```text
//! URL ─▶ resolve ─┬─ track ──────▶ Assembler ─▶ MP3 (buffered or streamed)
//!                 └─ collection ─▶ Packager ─▶ N × Assembler ─▶ ZIP stream
//! ```
//!
//! - [`transcoder`]: supervised ffmpeg runs behind the transcode gate
//! - [`assembler`]: locate, transcode, tag one track
//! - [`packager`]: concurrent assembly of a collection into an archive,
//!   entries in collection order
//! - [`reassembly`]: the in-order release primitive used by the packager
//! - [`archive`]: incrementally emitted ZIP writer
//! - [`downloader`]: the facade used by the HTTP layer
//!
//! With the `server` feature (default), [`DownloaderServerExt`] registers
//! the REST API on an `fsserver::Server`.

pub mod archive;
pub mod assembler;
pub mod config_ext;
pub mod cover_art;
pub mod downloader;
pub mod error;
pub mod filename;
pub mod packager;
pub mod reassembly;
pub mod tagging;
pub mod transcoder;

#[cfg(feature = "server")]
pub mod api_rest;
#[cfg(feature = "server")]
pub mod server_ext;

pub use archive::{compress_entry, ArchiveWriter, SharedArchive};
pub use assembler::{AssembleItem, Assembler, FinishedAudio};
pub use config_ext::{DownloadConfigExt, DownloadSettings, EncoderSettings};
pub use downloader::{Download, DownloadBody, Downloader};
pub use error::{DownloadError, Result};
pub use packager::Packager;
pub use reassembly::OrderedReassembly;
pub use tagging::AudioMetadata;
pub use transcoder::{ProcessOutcome, Transcoder};

#[cfg(feature = "server")]
pub use server_ext::DownloaderServerExt;
