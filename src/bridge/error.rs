use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

/// How a decoding engine process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineExit {
    Code(i32),
    Signal(i32),
}

impl EngineExit {
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return EngineExit::Code(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return EngineExit::Signal(signal);
            }
        }
        EngineExit::Code(-1)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, EngineExit::Code(0))
    }
}

impl fmt::Display for EngineExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineExit::Code(code) => write!(f, "exited with code {}", code),
            EngineExit::Signal(signal) => write!(f, "was terminated by signal {}", signal),
        }
    }
}

/// Terminal failure of one bridged stream
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The engine executable could not be started
    #[error("cannot start decoding engine {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The engine exited abnormally and/or wrote to its diagnostic channel.
    ///
    /// Integrity failures (CRC or length mismatch) detected by the engine
    /// arrive here with the engine's own wording in `diagnostics`.
    #[error("decoding engine {}", describe_engine(.exit, .diagnostics))]
    Engine {
        exit: Option<EngineExit>,
        diagnostics: String,
    },

    /// Reading the compressed source failed
    #[error("compressed source failed: {0}")]
    Source(#[source] io::Error),

    /// Feeding the engine's input failed for a reason other than the engine closing it
    #[error("writing to decoding engine failed: {0}")]
    EngineInput(#[source] io::Error),

    /// Reading decoded bytes from the engine failed
    #[error("reading from decoding engine failed: {0}")]
    EngineOutput(#[source] io::Error),

    /// The engine's exit status could not be collected
    #[error("cannot observe decoding engine exit: {0}")]
    EngineWait(#[source] io::Error),

    #[error("decoding engine did not finish within {0:?}")]
    Timeout(Duration),
}

fn describe_engine(exit: &Option<EngineExit>, diagnostics: &str) -> String {
    let diagnostics = diagnostics.trim_end();
    match (exit, diagnostics.is_empty()) {
        (Some(exit), true) => exit.to_string(),
        (Some(exit), false) => format!("{} and diagnostic output '{}'", exit, diagnostics),
        (None, false) => format!("wrote diagnostic output '{}'", diagnostics),
        (None, true) => "failed".to_string(),
    }
}

impl BridgeError {
    /// `io::ErrorKind` used when this error crosses the `AsyncRead` boundary
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            BridgeError::Spawn { source, .. } => source.kind(),
            BridgeError::Source(e)
            | BridgeError::EngineInput(e)
            | BridgeError::EngineOutput(e)
            | BridgeError::EngineWait(e) => e.kind(),
            BridgeError::Engine { .. } => io::ErrorKind::InvalidData,
            BridgeError::Timeout(_) => io::ErrorKind::TimedOut,
        }
    }

    /// Recover the bridge error carried by an `io::Error` returned from a bridged stream
    pub fn from_io(err: &io::Error) -> Option<&BridgeError> {
        err.get_ref().and_then(|inner| inner.downcast_ref::<BridgeError>())
    }

    pub(crate) fn into_io(self) -> io::Error {
        io::Error::new(self.kind(), self)
    }
}
