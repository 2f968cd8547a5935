#![allow(dead_code)]

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use flate2::Compression;
use flate2::write::DeflateEncoder;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use zipbridge::EntryMetadata;
use zipbridge::bridge::BridgeError;

/// One entry of an archive built by [`build_zip`]
pub struct TestEntry {
    pub name: String,
    pub method: u16,
    pub flags: u16,
    pub crc32: u32,
    pub uncompressed_size: u64,
    /// Bytes written after the local header, exactly as stored
    pub payload: Vec<u8>,
}

impl TestEntry {
    pub fn stored(name: &str, data: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            method: 0,
            flags: 0,
            crc32: crc32fast::hash(data),
            uncompressed_size: data.len() as u64,
            payload: data.to_vec(),
        }
    }

    pub fn deflated(name: &str, data: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            method: 8,
            flags: 0,
            crc32: crc32fast::hash(data),
            uncompressed_size: data.len() as u64,
            payload: deflate(data),
        }
    }

    /// Entry whose payload is opaque to the native reader
    pub fn opaque(name: &str, method: u16, payload: &[u8], decoded: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            method,
            flags: 0,
            crc32: crc32fast::hash(decoded),
            uncompressed_size: decoded.len() as u64,
            payload: payload.to_vec(),
        }
    }
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Sample data with some structure so deflate has work to do
pub fn sample(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31) % 251) as u8 ^ (i / 1000) as u8).collect()
}

/// Serialize `entries` into a ZIP archive.
///
/// With `zip64` set the archive ends with ZIP64 End of Central Directory
/// records and a saturated classic record.
pub fn build_zip(entries: &[TestEntry], comment: &[u8], zip64: bool) -> Vec<u8> {
    let mut out = Vec::new();
    let mut central = Vec::new();

    for entry in entries {
        let offset = out.len() as u32;
        let name = entry.name.as_bytes();

        out.extend_from_slice(b"PK\x03\x04");
        out.extend_from_slice(&20u16.to_le_bytes());
        out.extend_from_slice(&entry.flags.to_le_bytes());
        out.extend_from_slice(&entry.method.to_le_bytes());
        out.extend_from_slice(&0x6A2Fu16.to_le_bytes());
        out.extend_from_slice(&0x52CFu16.to_le_bytes());
        out.extend_from_slice(&entry.crc32.to_le_bytes());
        out.extend_from_slice(&(entry.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&(entry.uncompressed_size as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(name);
        out.extend_from_slice(&entry.payload);

        central.extend_from_slice(b"PK\x01\x02");
        central.extend_from_slice(&0x031Eu16.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes());
        central.extend_from_slice(&entry.flags.to_le_bytes());
        central.extend_from_slice(&entry.method.to_le_bytes());
        central.extend_from_slice(&0x6A2Fu16.to_le_bytes());
        central.extend_from_slice(&0x52CFu16.to_le_bytes());
        central.extend_from_slice(&entry.crc32.to_le_bytes());
        central.extend_from_slice(&(entry.payload.len() as u32).to_le_bytes());
        central.extend_from_slice(&(entry.uncompressed_size as u32).to_le_bytes());
        central.extend_from_slice(&(name.len() as u16).to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes()); // extra
        central.extend_from_slice(&0u16.to_le_bytes()); // comment
        central.extend_from_slice(&0u16.to_le_bytes()); // disk
        central.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
        central.extend_from_slice(&0u32.to_le_bytes()); // external attrs
        central.extend_from_slice(&offset.to_le_bytes());
        central.extend_from_slice(name);
    }

    let cd_offset = out.len() as u64;
    let cd_size = central.len() as u64;
    out.extend_from_slice(&central);

    if zip64 {
        let eocd64_offset = out.len() as u64;
        out.extend_from_slice(b"PK\x06\x06");
        out.extend_from_slice(&44u64.to_le_bytes());
        out.extend_from_slice(&45u16.to_le_bytes());
        out.extend_from_slice(&45u16.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(entries.len() as u64).to_le_bytes());
        out.extend_from_slice(&(entries.len() as u64).to_le_bytes());
        out.extend_from_slice(&cd_size.to_le_bytes());
        out.extend_from_slice(&cd_offset.to_le_bytes());

        out.extend_from_slice(b"PK\x06\x07");
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&eocd64_offset.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
    }

    out.extend_from_slice(b"PK\x05\x06");
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    let count = if zip64 { 0xFFFF } else { entries.len() as u16 };
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());
    let (size32, offset32) = if zip64 {
        (0xFFFF_FFFFu32, 0xFFFF_FFFFu32)
    } else {
        (cd_size as u32, cd_offset as u32)
    };
    out.extend_from_slice(&size32.to_le_bytes());
    out.extend_from_slice(&offset32.to_le_bytes());
    out.extend_from_slice(&(comment.len() as u16).to_le_bytes());
    out.extend_from_slice(comment);

    out
}

pub fn metadata(method: u16, payload_len: u64, decoded: &[u8]) -> EntryMetadata {
    EntryMetadata {
        compression_method: method,
        crc32: crc32fast::hash(decoded),
        compressed_size: payload_len,
        uncompressed_size: decoded.len() as u64,
        last_mod_time: 0x6A2F,
        last_mod_date: 0x52CF,
        version_needed: 20,
        flags: 0,
    }
}

/// Write an executable `/bin/sh` script standing in for a decoding engine.
#[cfg(unix)]
pub fn script_engine(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Engine that echoes its whole input: output is header followed by payload
pub const ECHO_ENGINE: &str = "exec cat";

/// Engine that drops the 31-byte classic header and emits the payload as decoded data
pub const SKIP_HEADER_ENGINE: &str = "exec tail -c +32";

pub const CRC_FAIL_ENGINE: &str =
    "cat > /dev/null\necho 'funzip error: invalid compressed data--crc error' >&2\nexit 4";

pub const HANG_ENGINE: &str = "exec sleep 30";

/// Everything observed on a stream up to its terminal event
pub struct Drained {
    pub data: Vec<u8>,
    pub error: Option<io::Error>,
}

impl Drained {
    pub fn bridge_error(&self) -> Option<&BridgeError> {
        self.error.as_ref().and_then(BridgeError::from_io)
    }
}

/// Read until end of file or the first error, then check the stream stays quiet.
pub async fn drain<S: AsyncRead + Unpin>(stream: &mut S) -> Drained {
    let mut data = Vec::new();
    let mut buf = vec![0u8; 8192];
    let error = loop {
        match stream.read(&mut buf).await {
            Ok(0) => break None,
            Ok(n) => data.extend_from_slice(&buf[..n]),
            Err(e) => break Some(e),
        }
    };

    // no second terminal event and no late data
    for _ in 0..3 {
        let n = stream.read(&mut buf).await.expect("read after terminal event failed");
        assert_eq!(n, 0, "data delivered after terminal event");
    }

    Drained { data, error }
}

/// Source that never produces data and records when it is dropped
pub struct StalledSource {
    dropped: Arc<AtomicBool>,
}

impl StalledSource {
    pub fn new() -> (Self, Arc<AtomicBool>) {
        let dropped = Arc::new(AtomicBool::new(false));
        (
            Self {
                dropped: Arc::clone(&dropped),
            },
            dropped,
        )
    }
}

impl AsyncRead for StalledSource {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}

impl Drop for StalledSource {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

/// Source that yields `prefix` and then fails
pub struct FailingSource {
    prefix: Option<Vec<u8>>,
}

impl FailingSource {
    pub fn new(prefix: &[u8]) -> Self {
        Self {
            prefix: Some(prefix.to_vec()),
        }
    }
}

impl AsyncRead for FailingSource {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.prefix.take() {
            Some(prefix) => {
                buf.put_slice(&prefix);
                Poll::Ready(Ok(()))
            }
            None => Poll::Ready(Err(io::Error::other("disk unplugged"))),
        }
    }
}
