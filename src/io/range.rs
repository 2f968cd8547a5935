use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

use super::ReadAt;

const CHUNK_SIZE: u64 = 64 * 1024;

type ChunkFuture = Pin<Box<dyn Future<Output = io::Result<Vec<u8>>> + Send>>;

/// Forward-only [`AsyncRead`] over `[offset, offset + len)` of a [`ReadAt`] source.
///
/// Data is fetched one chunk at a time, so at most one chunk is held in
/// memory regardless of the range length.
pub struct RangeStream<R: ReadAt + 'static> {
    reader: Arc<R>,
    next: u64,
    end: u64,
    chunk: Vec<u8>,
    consumed: usize,
    pending: Option<ChunkFuture>,
}

impl<R: ReadAt + 'static> RangeStream<R> {
    pub fn new(reader: Arc<R>, offset: u64, len: u64) -> Self {
        Self {
            reader,
            next: offset,
            end: offset.saturating_add(len),
            chunk: Vec::new(),
            consumed: 0,
            pending: None,
        }
    }

    /// Bytes not yet handed to the caller
    pub fn remaining(&self) -> u64 {
        (self.end - self.next) + (self.chunk.len() - self.consumed) as u64
    }

    fn fetch(&mut self) -> ChunkFuture {
        let reader = Arc::clone(&self.reader);
        let offset = self.next;
        let len = (self.end - self.next).min(CHUNK_SIZE) as usize;
        Box::pin(async move {
            let mut chunk = vec![0u8; len];
            let mut filled = 0;
            while filled < len {
                let n = reader
                    .read_at(offset + filled as u64, &mut chunk[filled..])
                    .await
                    .map_err(io::Error::other)?;
                if n == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("archive ended {} bytes into a {} byte read at {}", filled, len, offset),
                    ));
                }
                filled += n;
            }
            Ok(chunk)
        })
    }
}

impl<R: ReadAt + 'static> AsyncRead for RangeStream<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        loop {
            if this.consumed < this.chunk.len() {
                let n = buf.remaining().min(this.chunk.len() - this.consumed);
                buf.put_slice(&this.chunk[this.consumed..this.consumed + n]);
                this.consumed += n;
                return Poll::Ready(Ok(()));
            }
            if this.next >= this.end {
                return Poll::Ready(Ok(()));
            }

            if this.pending.is_none() {
                this.pending = Some(this.fetch());
            }
            let fut = match this.pending.as_mut() {
                Some(fut) => fut,
                None => return Poll::Ready(Ok(())),
            };
            let chunk = match fut.as_mut().poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(result) => {
                    this.pending = None;
                    result?
                }
            };
            this.next += chunk.len() as u64;
            this.chunk = chunk;
            this.consumed = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn reads_exactly_the_requested_window() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let reader = Arc::new(MemoryReader::new(data.clone()));

        let mut stream = RangeStream::new(reader, 1000, 150_000);
        assert_eq!(stream.remaining(), 150_000);

        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, &data[1000..151_000]);
        assert_eq!(stream.remaining(), 0);
    }

    #[tokio::test]
    async fn short_source_is_an_error() {
        let reader = Arc::new(MemoryReader::new(vec![7u8; 10]));
        let mut stream = RangeStream::new(reader, 4, 20);

        let mut out = Vec::new();
        let err = stream.read_to_end(&mut out).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
