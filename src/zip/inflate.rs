//! Incremental raw-deflate decoding over an async byte stream.
//!
//! Only one compressed chunk and the caller's buffer are held at a time, so
//! memory use does not grow with the size of the entry.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use flate2::{Decompress, FlushDecompress, Status};
use tokio::io::{AsyncRead, ReadBuf};

const INPUT_CHUNK: usize = 32 * 1024;

/// Decodes the raw deflate stream read from `inner` as it is polled
pub(crate) struct InflateStream<S> {
    inner: S,
    inflater: Decompress,
    input: Box<[u8]>,
    start: usize,
    end: usize,
    input_done: bool,
    finished: bool,
}

impl<S> InflateStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            // ZIP payloads carry no zlib header
            inflater: Decompress::new(false),
            input: vec![0u8; INPUT_CHUNK].into_boxed_slice(),
            start: 0,
            end: 0,
            input_done: false,
            finished: false,
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for InflateStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if this.finished || buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        loop {
            if this.start == this.end && !this.input_done {
                let mut fill = ReadBuf::new(&mut this.input[..]);
                ready!(Pin::new(&mut this.inner).poll_read(cx, &mut fill))?;
                let n = fill.filled().len();
                this.start = 0;
                this.end = n;
                this.input_done = n == 0;
            }

            let flush = if this.input_done {
                FlushDecompress::Finish
            } else {
                FlushDecompress::None
            };
            let before_in = this.inflater.total_in();
            let before_out = this.inflater.total_out();
            let status = this
                .inflater
                .decompress(
                    &this.input[this.start..this.end],
                    buf.initialize_unfilled(),
                    flush,
                )
                .map_err(|e| {
                    io::Error::new(io::ErrorKind::InvalidData, format!("corrupt deflate data: {}", e))
                })?;
            let consumed = (this.inflater.total_in() - before_in) as usize;
            let produced = (this.inflater.total_out() - before_out) as usize;
            this.start += consumed;
            buf.advance(produced);

            if matches!(status, Status::StreamEnd) {
                this.finished = true;
                return Poll::Ready(Ok(()));
            }
            if produced > 0 {
                return Poll::Ready(Ok(()));
            }
            if consumed == 0 {
                if this.input_done {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "deflate stream is truncated",
                    )));
                }
                if this.start < this.end {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "deflate stream stalled",
                    )));
                }
            }
        }
    }
}
