use std::future::{Future, pending};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, ReadBuf};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::config::BridgeConfig;
use super::engine::EngineProcess;
use super::error::BridgeError;
use super::header::synthesize_header;
use super::state::{BridgeState, Completion, Event};
use crate::zip::EntryMetadata;

/// Read size for every pipe the bridge services
const PIPE_CHUNK: usize = 32 * 1024;

/// Decoded chunks buffered between the engine and the consumer
const OUTPUT_DEPTH: usize = 8;

type Delivery = Result<Vec<u8>, BridgeError>;

/// Decode `source` (the raw payload of the entry described by `meta`)
/// through the configured engine.
///
/// Must be called from within a tokio runtime. Never fails directly: a spawn
/// failure is reported as the stream's single error.
pub fn open<S>(meta: EntryMetadata, source: S, config: &BridgeConfig) -> BridgeStream
where
    S: AsyncRead + Send + Unpin + 'static,
{
    let (tx, rx) = mpsc::channel(OUTPUT_DEPTH);
    let (cancel_tx, cancel_rx) = oneshot::channel();

    let engine = EngineProcess::spawn(&config.engine_path).and_then(|mut engine| {
        match (engine.take_stdin(), engine.take_stdout(), engine.take_stderr()) {
            (Some(stdin), Some(stdout), Some(stderr)) => Ok((engine, stdin, stdout, stderr)),
            _ => Err(BridgeError::Spawn {
                path: config.engine_path.display().to_string(),
                source: io::Error::other("engine channels are not piped"),
            }),
        }
    });

    let (engine, stdin, stdout, stderr) = match engine {
        Ok(parts) => parts,
        Err(err) => {
            debug!("bridge not started: {}", err);
            // Fresh channel with spare capacity: this cannot be rejected
            let _ = tx.try_send(Err(err));
            return BridgeStream::new(rx, cancel_tx, None, None);
        }
    };

    debug!(
        "bridging method {} payload ({} -> {} bytes) through {}",
        meta.compression_method,
        meta.compressed_size,
        meta.uncompressed_size,
        config.engine_path.display()
    );

    let engine_id = engine.id();
    let driver = Driver {
        engine,
        stderr,
        tx: tx.clone(),
        cancel: cancel_rx,
        timeout: config.engine_timeout,
    };
    let feed = Box::pin(feed_engine(synthesize_header(&meta), source, stdin));
    let pump = Box::pin(pump_output(stdout, tx));
    let handle = tokio::spawn(driver.run(feed, pump));

    BridgeStream::new(rx, cancel_tx, Some(handle), engine_id)
}

/// Decoded output of one bridged entry.
///
/// Yields the engine's output in order, then either end of file or exactly
/// one error (an `io::Error` wrapping a [`BridgeError`]). Reads after the
/// terminal event, or after [`cancel`](Self::cancel), return end of file.
/// Dropping the stream cancels the bridge.
pub struct BridgeStream {
    rx: mpsc::Receiver<Delivery>,
    chunk: Vec<u8>,
    consumed: usize,
    cancel: Option<oneshot::Sender<()>>,
    driver: Option<JoinHandle<()>>,
    engine_id: Option<u32>,
    terminated: bool,
}

impl BridgeStream {
    fn new(
        rx: mpsc::Receiver<Delivery>,
        cancel: oneshot::Sender<()>,
        driver: Option<JoinHandle<()>>,
        engine_id: Option<u32>,
    ) -> Self {
        Self {
            rx,
            chunk: Vec::new(),
            consumed: 0,
            cancel: Some(cancel),
            driver,
            engine_id,
            terminated: false,
        }
    }

    /// Stop the bridge: kill the engine and release the source.
    ///
    /// Nothing more is delivered afterwards. Calling it again is a no-op.
    pub fn cancel(&mut self) {
        self.terminated = true;
        self.chunk.clear();
        self.consumed = 0;
        self.rx.close();
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    /// Cancel and wait until the engine has exited and the source is released.
    pub async fn shutdown(mut self) {
        self.cancel();
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.await {
                warn!("bridge driver did not shut down cleanly: {}", e);
            }
        }
    }

    /// OS process id of the engine, if it was started
    pub fn engine_id(&self) -> Option<u32> {
        self.engine_id
    }
}

impl AsyncRead for BridgeStream {
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
            if this.terminated {
                return Poll::Ready(Ok(()));
            }

            match this.rx.poll_recv(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => {
                    this.terminated = true;
                    return Poll::Ready(Ok(()));
                }
                Poll::Ready(Some(Ok(chunk))) => {
                    this.chunk = chunk;
                    this.consumed = 0;
                }
                Poll::Ready(Some(Err(err))) => {
                    this.terminated = true;
                    return Poll::Ready(Err(err.into_io()));
                }
            }
        }
    }
}

enum FeedEnd {
    Done,
    EngineClosed,
    SourceFailed(io::Error),
    WriteFailed(io::Error),
}

enum PumpEnd {
    Eof,
    ReadFailed(io::Error),
    ConsumerGone,
}

/// Write the header, then the unmodified payload, then close the engine's input.
async fn feed_engine<S>(header: Vec<u8>, mut source: S, mut stdin: ChildStdin) -> FeedEnd
where
    S: AsyncRead + Unpin,
{
    if let Err(e) = stdin.write_all(&header).await {
        return write_failure(e);
    }

    let mut buf = vec![0u8; PIPE_CHUNK];
    loop {
        let n = match source.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => return FeedEnd::SourceFailed(e),
        };
        if let Err(e) = stdin.write_all(&buf[..n]).await {
            return write_failure(e);
        }
    }

    match stdin.shutdown().await {
        Ok(()) => FeedEnd::Done,
        Err(e) => write_failure(e),
    }
}

fn write_failure(e: io::Error) -> FeedEnd {
    // The engine stopped reading; its exit status and diagnostics explain why
    if e.kind() == io::ErrorKind::BrokenPipe {
        FeedEnd::EngineClosed
    } else {
        FeedEnd::WriteFailed(e)
    }
}

/// Forward decoded chunks to the consumer, waiting for room in the channel.
async fn pump_output(mut stdout: ChildStdout, tx: mpsc::Sender<Delivery>) -> PumpEnd {
    loop {
        let mut chunk = vec![0u8; PIPE_CHUNK];
        match stdout.read(&mut chunk).await {
            Ok(0) => return PumpEnd::Eof,
            Ok(n) => {
                chunk.truncate(n);
                if tx.send(Ok(chunk)).await.is_err() {
                    return PumpEnd::ConsumerGone;
                }
            }
            Err(e) => return PumpEnd::ReadFailed(e),
        }
    }
}

async fn poll_slot<F: Future + Unpin>(slot: &mut Option<F>) -> F::Output {
    match slot.as_mut() {
        Some(fut) => fut.await,
        None => pending().await,
    }
}

async fn read_diagnostics(stderr: &mut Option<ChildStderr>, buf: &mut [u8]) -> io::Result<usize> {
    match stderr.as_mut() {
        Some(stderr) => stderr.read(buf).await,
        None => pending().await,
    }
}

async fn deadline(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => pending().await,
    }
}

struct Driver {
    engine: EngineProcess,
    stderr: ChildStderr,
    tx: mpsc::Sender<Delivery>,
    cancel: oneshot::Receiver<()>,
    timeout: Option<Duration>,
}

impl Driver {
    async fn run<F, P>(self, feed: F, pump: P)
    where
        F: Future<Output = FeedEnd> + Unpin,
        P: Future<Output = PumpEnd> + Unpin,
    {
        let Driver {
            mut engine,
            stderr,
            tx,
            mut cancel,
            timeout,
        } = self;

        let mut state = BridgeState::new();
        let mut feed = Some(feed);
        let mut pump = Some(pump);
        let mut stderr = Some(stderr);
        let mut diag_buf = vec![0u8; 4096];
        let mut exited = false;
        let mut cancel_armed = true;
        let mut deadline_armed = timeout.is_some();
        let expiry = deadline(timeout);
        tokio::pin!(expiry);

        loop {
            let event = tokio::select! {
                end = poll_slot(&mut feed), if feed.is_some() => {
                    feed = None;
                    match end {
                        FeedEnd::Done => Event::SourceEnded,
                        FeedEnd::EngineClosed => Event::InputClosed,
                        FeedEnd::SourceFailed(e) => Event::SourceFailed(e),
                        FeedEnd::WriteFailed(e) => Event::InputFailed(e),
                    }
                }
                end = poll_slot(&mut pump), if pump.is_some() => {
                    pump = None;
                    match end {
                        PumpEnd::Eof => Event::OutputEnded,
                        PumpEnd::ReadFailed(e) => Event::OutputFailed(e),
                        PumpEnd::ConsumerGone => Event::Cancelled,
                    }
                }
                read = read_diagnostics(&mut stderr, &mut diag_buf), if stderr.is_some() => {
                    match read {
                        Ok(0) => {
                            stderr = None;
                            Event::DiagnosticsEnded
                        }
                        Ok(n) => Event::Diagnostic(diag_buf[..n].to_vec()),
                        Err(e) => {
                            debug!("diagnostic channel unreadable: {}", e);
                            stderr = None;
                            Event::DiagnosticsEnded
                        }
                    }
                }
                exit = engine.wait(), if !exited => {
                    exited = true;
                    match exit {
                        Ok(exit) => Event::EngineExited(exit),
                        Err(e) => Event::EngineLost(e),
                    }
                }
                _ = &mut cancel, if cancel_armed => {
                    cancel_armed = false;
                    Event::Cancelled
                }
                _ = &mut expiry, if deadline_armed => {
                    deadline_armed = false;
                    Event::TimedOut(timeout.unwrap_or_default())
                }
                else => break,
            };

            let transition = state.apply(event);

            if transition.teardown {
                debug!("tearing down bridge");
                feed = None;
                pump = None;
                if state.kill_requested() {
                    engine.kill();
                }
            }

            if let Some(done) = transition.finish {
                match done {
                    Completion::Completed => debug!("bridge completed"),
                    Completion::Cancelled => debug!("bridge cancelled before completion"),
                    Completion::Failed(err) => {
                        let _ = tx.send(Err(err)).await;
                    }
                }
                break;
            }
        }
    }
}
