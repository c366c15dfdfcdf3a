//! Incrementally emitted ZIP archive
//!
//! Entries are compressed ahead of time into one-entry in-memory archives
//! ([`compress_entry`]), then raw-copied into a temporary ZIP file. After
//! each append the bytes written since the previous append are read back
//! and handed to the caller, so the archive can be streamed while it is
//! being built. [`ArchiveWriter::finish`] emits the central directory.
//!
//! The backing file is removed when the writer is dropped.

use std::collections::HashSet;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use bytes::Bytes;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{DownloadError, Result};

/// Entry data compressed into a one-entry ZIP
#[derive(Debug, Clone)]
pub struct CompressedEntry(Vec<u8>);

impl CompressedEntry {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn entry_options(level: i64) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(level))
}

/// Deflates `data` at `level`, ready for [`ArchiveWriter::append`]
pub fn compress_entry(data: &[u8], level: i64) -> Result<CompressedEntry> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("entry", entry_options(level))?;
    zip.write_all(data)?;
    let cursor = zip.finish()?;
    Ok(CompressedEntry(cursor.into_inner()))
}

/// ZIP file under construction
pub struct ArchiveWriter {
    writer: Option<ZipWriter<File>>,
    reader: File,
    // Keeps the file alive, deletes it on drop
    _file: NamedTempFile,
    emitted: u64,
    entries: usize,
    names: HashSet<String>,
    max_name_length: usize,
}

impl ArchiveWriter {
    /// Creates an empty archive whose entry names stay within
    /// `max_name_length` characters
    pub fn new(max_name_length: usize) -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("freesound-")
            .suffix(".zip")
            .tempfile()?;
        let writer = ZipWriter::new(file.reopen()?);
        let reader = file.reopen()?;

        Ok(Self {
            writer: Some(writer),
            reader,
            _file: file,
            emitted: 0,
            entries: 0,
            names: HashSet::new(),
            max_name_length,
        })
    }

    /// Number of entries written
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Bytes handed out so far
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Returns `name`, suffixed with ` (2)`, ` (3)`... when already used
    ///
    /// The stem is shortened so a suffixed name still fits the length limit.
    fn unique_name(&mut self, name: &str) -> String {
        if self.names.insert(name.to_string()) {
            return name.to_string();
        }

        let (stem, ext) = match name.rfind('.') {
            Some(dot) if dot > 0 => name.split_at(dot),
            _ => (name, ""),
        };

        let mut n = 2;
        loop {
            let suffix = format!(" ({})", n);
            let budget = self
                .max_name_length
                .saturating_sub(suffix.chars().count() + ext.chars().count());
            let stem: String = stem.chars().take(budget).collect();
            let candidate = format!("{}{}{}", stem, suffix, ext);
            if self.names.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Appends an entry and returns the newly written bytes
    pub fn append(&mut self, name: &str, entry: CompressedEntry) -> Result<Bytes> {
        let name = self.unique_name(name);
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| DownloadError::Archive("archive already finished".into()))?;

        let mut source = ZipArchive::new(Cursor::new(entry.0))?;
        let file = source.by_index_raw(0)?;
        writer.raw_copy_file_rename(file, name.as_str())?;
        writer.flush()?;

        self.entries += 1;
        self.read_new_bytes()
    }

    /// Writes the central directory and returns the final bytes
    pub fn finish(&mut self) -> Result<Bytes> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| DownloadError::Archive("archive already finished".into()))?;
        let mut file = writer.finish()?;
        file.flush()?;
        self.read_new_bytes()
    }

    fn read_new_bytes(&mut self) -> Result<Bytes> {
        let len = self.reader.metadata()?.len();
        if len <= self.emitted {
            return Ok(Bytes::new());
        }

        let mut buf = vec![0u8; (len - self.emitted) as usize];
        self.reader.seek(SeekFrom::Start(self.emitted))?;
        self.reader.read_exact(&mut buf)?;
        self.emitted = len;
        Ok(Bytes::from(buf))
    }
}

/// [`ArchiveWriter`] behind an async lock
///
/// File work runs on the blocking pool while the lock is held, so appends
/// and the final flush never interleave.
#[derive(Clone)]
pub struct SharedArchive {
    inner: Arc<Mutex<ArchiveWriter>>,
}

impl SharedArchive {
    pub fn new(max_name_length: usize) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(Mutex::new(ArchiveWriter::new(max_name_length)?)),
        })
    }

    pub async fn append(&self, name: String, entry: CompressedEntry) -> Result<Bytes> {
        let mut guard = self.inner.clone().lock_owned().await;
        tokio::task::spawn_blocking(move || guard.append(&name, entry)).await?
    }

    pub async fn finish(&self) -> Result<Bytes> {
        let mut guard = self.inner.clone().lock_owned().await;
        tokio::task::spawn_blocking(move || guard.finish()).await?
    }

    pub async fn entries(&self) -> usize {
        self.inner.lock().await.entries()
    }
}
