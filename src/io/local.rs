use super::ReadAt;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Local file reader with random access support.
///
/// Positional reads run on the blocking pool so a slow disk never stalls the
/// runtime that also drives decoding engines.
pub struct LocalFileReader {
    file: Arc<std::fs::File>,
    size: u64,
}

impl LocalFileReader {
    pub fn new(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("cannot open {}", path.display()))?;
        let size = file.metadata()?.len();
        Ok(Self {
            file: Arc::new(file),
            size,
        })
    }
}

#[async_trait]
impl ReadAt for LocalFileReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || offset >= self.size {
            return Ok(0);
        }

        let file = Arc::clone(&self.file);
        let len = buf.len();
        let chunk = tokio::task::spawn_blocking(move || read_chunk(&file, offset, len)).await??;
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }

    fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(unix)]
fn read_chunk(file: &std::fs::File, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
    use std::os::unix::fs::FileExt;

    let mut chunk = vec![0u8; len];
    let n = file.read_at(&mut chunk, offset)?;
    chunk.truncate(n);
    Ok(chunk)
}

#[cfg(windows)]
fn read_chunk(file: &std::fs::File, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
    use std::os::windows::fs::FileExt;

    let mut chunk = vec![0u8; len];
    let n = file.seek_read(&mut chunk, offset)?;
    chunk.truncate(n);
    Ok(chunk)
}

#[cfg(not(any(unix, windows)))]
fn read_chunk(mut file: &std::fs::File, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
    use std::io::{Read, Seek, SeekFrom};

    let mut chunk = vec![0u8; len];
    file.seek(SeekFrom::Start(offset))?;
    let n = file.read(&mut chunk)?;
    chunk.truncate(n);
    Ok(chunk)
}
