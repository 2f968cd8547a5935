use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use anyhow::{Context as _, Result, bail};
use async_trait::async_trait;
use log::debug;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};

use crate::io::{RangeStream, ReadAt};

use super::inflate::InflateStream;
use super::parser::ZipParser;
use super::structures::{CompressionMethod, ZipFileEntry};

/// Byte stream of one entry, decoded or raw depending on [`ReadOptions`]
pub type EntryStream = Pin<Box<dyn AsyncRead + Send>>;

/// Per-call options for [`EntryReader::open_read_stream`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Decode the payload; `false` yields the stored bytes unchanged
    pub decompress: bool,
    /// First payload byte to return (raw reads and stored entries only)
    pub start: Option<u64>,
    /// One past the last payload byte to return
    pub end: Option<u64>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            decompress: true,
            start: None,
            end: None,
        }
    }
}

impl ReadOptions {
    pub fn raw() -> Self {
        Self {
            decompress: false,
            ..Self::default()
        }
    }

    pub fn is_ranged(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }
}

/// Capability shared by the base archive reader and the readers decorating it
#[async_trait]
pub trait EntryReader: Send + Sync {
    /// List all entries in the archive
    async fn list_files(&self) -> Result<Vec<ZipFileEntry>>;

    /// Open a forward-only stream over one entry
    async fn open_read_stream(
        &self,
        entry: &ZipFileEntry,
        options: &ReadOptions,
    ) -> Result<EntryStream>;
}

/// Base ZIP reader.
///
/// Serves raw payloads for every method and decodes Stored and Deflate
/// entries natively, verifying their CRC-32 and size.
pub struct ZipArchive<R: ReadAt + 'static> {
    parser: ZipParser<R>,
}

impl<R: ReadAt + 'static> ZipArchive<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self {
            parser: ZipParser::new(reader),
        }
    }

    fn payload_range(entry: &ZipFileEntry, options: &ReadOptions) -> Result<(u64, u64)> {
        let start = options.start.unwrap_or(0);
        let end = options.end.unwrap_or(entry.compressed_size);
        if start > end || end > entry.compressed_size {
            bail!(
                "Invalid range {}..{} for {} ({} bytes stored)",
                start,
                end,
                entry.file_name,
                entry.compressed_size
            );
        }
        Ok((start, end))
    }
}

#[async_trait]
impl<R: ReadAt + 'static> EntryReader for ZipArchive<R> {
    async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        self.parser.list_files().await
    }

    async fn open_read_stream(
        &self,
        entry: &ZipFileEntry,
        options: &ReadOptions,
    ) -> Result<EntryStream> {
        let method = entry.compression_method;
        if options.decompress && options.is_ranged() && method != CompressionMethod::Stored {
            bail!(
                "Cannot read a byte range of {} while decompressing it (method {})",
                entry.file_name,
                method.as_u16()
            );
        }

        let data_offset = self.parser.get_data_offset(entry).await?;
        let reader = Arc::clone(self.parser.reader());

        if !options.decompress {
            let (start, end) = Self::payload_range(entry, options)?;
            debug!("raw read of {} [{}..{})", entry.file_name, start, end);
            return Ok(Box::pin(RangeStream::new(reader, data_offset + start, end - start)));
        }

        match method {
            CompressionMethod::Stored if options.is_ranged() => {
                let (start, end) = Self::payload_range(entry, options)?;
                Ok(Box::pin(RangeStream::new(reader, data_offset + start, end - start)))
            }
            CompressionMethod::Stored => {
                if entry.compressed_size != entry.uncompressed_size {
                    bail!(
                        "Stored entry {} has mismatched sizes ({} stored, {} declared)",
                        entry.file_name,
                        entry.compressed_size,
                        entry.uncompressed_size
                    );
                }
                let raw = RangeStream::new(reader, data_offset, entry.compressed_size);
                Ok(Box::pin(VerifyingStream::new(raw, entry)))
            }
            CompressionMethod::Deflate => {
                let raw = RangeStream::new(reader, data_offset, entry.compressed_size);
                Ok(Box::pin(VerifyingStream::new(InflateStream::new(raw), entry)))
            }
            other => bail!(
                "Unsupported compression method: {} for {}",
                other.as_u16(),
                entry.file_name
            ),
        }
    }
}

/// Checks decoded length and CRC-32 against the entry as bytes pass through.
///
/// The mismatch is reported as an `InvalidData` error in place of end of file.
/// Bytes past the declared size are never handed out; after the verdict the
/// stream reads as end of file.
struct VerifyingStream<S> {
    inner: S,
    hasher: crc32fast::Hasher,
    seen: u64,
    expected_size: u64,
    expected_crc: u32,
    done: bool,
}

impl<S> VerifyingStream<S> {
    fn new(inner: S, entry: &ZipFileEntry) -> Self {
        Self {
            inner,
            hasher: crc32fast::Hasher::new(),
            seen: 0,
            expected_size: entry.uncompressed_size,
            expected_crc: entry.crc32,
            done: false,
        }
    }

    fn check(&self) -> io::Result<()> {
        if self.seen != self.expected_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "size mismatch: expected {} bytes, got {}",
                    self.expected_size, self.seen
                ),
            ));
        }
        let crc = self.hasher.clone().finalize();
        if crc != self.expected_crc {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "CRC-32 mismatch: expected {:08x}, got {:08x}",
                    self.expected_crc, crc
                ),
            ));
        }
        Ok(())
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for VerifyingStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if this.done {
            return Poll::Ready(Ok(()));
        }

        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let fresh = &buf.filled()[before..];
                if fresh.is_empty() && buf.remaining() > 0 {
                    this.done = true;
                    return Poll::Ready(this.check());
                }
                this.hasher.update(fresh);
                this.seen += fresh.len() as u64;
                if this.seen > this.expected_size {
                    // An error return must not leave bytes in the buffer
                    buf.set_filled(before);
                    this.done = true;
                    return Poll::Ready(this.check());
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

/// Stream an entry into `writer`, returning the number of bytes written.
pub async fn extract_to_writer<E, W>(reader: &E, entry: &ZipFileEntry, writer: &mut W) -> Result<u64>
where
    E: EntryReader + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut stream = reader
        .open_read_stream(entry, &ReadOptions::default())
        .await?;
    let written = tokio::io::copy(&mut stream, writer)
        .await
        .with_context(|| format!("Failed to extract {}", entry.file_name))?;
    writer.flush().await?;
    Ok(written)
}

/// Extract an entry to `output_path`, creating parent directories.
///
/// A partially written file is removed when extraction fails.
pub async fn extract_to_file<E>(reader: &E, entry: &ZipFileEntry, output_path: &Path) -> Result<u64>
where
    E: EntryReader + ?Sized,
{
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let mut file = fs::File::create(output_path)
        .await
        .with_context(|| format!("Cannot create {}", output_path.display()))?;
    match extract_to_writer(reader, entry, &mut file).await {
        Ok(written) => Ok(written),
        Err(e) => {
            drop(file);
            let _ = fs::remove_file(output_path).await;
            Err(e)
        }
    }
}
