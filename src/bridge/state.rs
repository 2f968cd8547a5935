//! Completion bookkeeping for one bridged stream.
//!
//! Every signal coming from the source, the engine process and the engine's
//! output is folded into [`BridgeState`] through [`BridgeState::apply`]. The
//! reducer is synchronous and free of I/O; the driver in `stream.rs` performs
//! the teardown and delivery it asks for.
//!
//! A stream finishes once all three resources are *settled*: the source has
//! ended or was torn down, the engine has exited and its diagnostic channel
//! reached end of file, and the engine output has ended or was detached. It
//! finishes exactly once.

use std::io;
use std::time::Duration;

use log::debug;

use super::error::{BridgeError, EngineExit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SourceState {
    Streaming,
    Ended,
    TornDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EngineState {
    Running,
    Exited(EngineExit),
    /// Exit status could not be collected
    Lost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DiagnosticState {
    Open,
    Drained,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputState {
    Streaming,
    Ended,
    Detached,
}

#[derive(Debug)]
pub(crate) enum Event {
    SourceEnded,
    SourceFailed(io::Error),
    /// The engine closed its input before the source was exhausted
    InputClosed,
    InputFailed(io::Error),
    /// Raw bytes read from the engine's diagnostic channel
    Diagnostic(Vec<u8>),
    DiagnosticsEnded,
    EngineExited(EngineExit),
    EngineLost(io::Error),
    OutputEnded,
    OutputFailed(io::Error),
    TimedOut(Duration),
    Cancelled,
}

/// Terminal outcome delivered to the consumer
#[derive(Debug)]
pub(crate) enum Completion {
    Completed,
    Failed(BridgeError),
    Cancelled,
}

/// What the driver must do after an event
#[derive(Debug)]
pub(crate) struct Transition {
    pub teardown: bool,
    pub finish: Option<Completion>,
}

#[derive(Debug)]
pub(crate) struct BridgeState {
    source: SourceState,
    engine: EngineState,
    diagnostics: DiagnosticState,
    output: OutputState,
    failure: Option<BridgeError>,
    /// Diagnostic bytes of an engine failure, decoded once at finish
    diagnostic_output: Vec<u8>,
    cancelled: bool,
    torn_down: bool,
    kill_requested: bool,
    finished: bool,
}

impl BridgeState {
    pub fn new() -> Self {
        Self {
            source: SourceState::Streaming,
            engine: EngineState::Running,
            diagnostics: DiagnosticState::Open,
            output: OutputState::Streaming,
            failure: None,
            diagnostic_output: Vec::new(),
            cancelled: false,
            torn_down: false,
            kill_requested: false,
            finished: false,
        }
    }

    pub fn apply(&mut self, event: Event) -> Transition {
        if self.finished {
            return Transition {
                teardown: false,
                finish: None,
            };
        }

        let wants_teardown = match event {
            Event::SourceEnded | Event::InputClosed => {
                self.settle_source(SourceState::Ended);
                false
            }
            Event::SourceFailed(e) => {
                self.settle_source(SourceState::Ended);
                self.fail(BridgeError::Source(e))
            }
            Event::InputFailed(e) => {
                self.settle_source(SourceState::TornDown);
                self.fail(BridgeError::EngineInput(e))
            }
            Event::Diagnostic(bytes) => self.diagnose(bytes),
            Event::DiagnosticsEnded => {
                self.diagnostics = DiagnosticState::Drained;
                false
            }
            Event::EngineExited(exit) => self.engine_exited(exit),
            Event::EngineLost(e) => {
                self.engine = EngineState::Lost;
                self.fail(BridgeError::EngineWait(e))
            }
            Event::OutputEnded => {
                if self.output == OutputState::Streaming {
                    self.output = OutputState::Ended;
                }
                false
            }
            Event::OutputFailed(e) => {
                if self.output == OutputState::Streaming {
                    self.output = OutputState::Ended;
                }
                self.fail(BridgeError::EngineOutput(e))
            }
            Event::TimedOut(limit) => self.fail(BridgeError::Timeout(limit)),
            Event::Cancelled => self.cancel(),
        };

        let teardown = wants_teardown && self.begin_teardown();
        Transition {
            teardown,
            finish: self.try_finish(),
        }
    }

    /// Whether teardown decided to signal a still-running engine
    pub fn kill_requested(&self) -> bool {
        self.kill_requested
    }

    #[cfg(test)]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    fn settle_source(&mut self, to: SourceState) {
        if self.source == SourceState::Streaming {
            self.source = to;
        }
    }

    /// Record the first failure; returns whether teardown is needed.
    fn fail(&mut self, err: BridgeError) -> bool {
        if self.failure.is_some() || self.cancelled {
            debug!("discarding later bridge failure: {}", err);
            return false;
        }
        debug!("bridge failed: {}", err);
        self.failure = Some(err);
        true
    }

    fn cancel(&mut self) -> bool {
        if self.failure.is_some() || self.cancelled {
            return false;
        }
        debug!("bridge cancelled");
        self.cancelled = true;
        true
    }

    fn diagnose(&mut self, bytes: Vec<u8>) -> bool {
        if let Some(BridgeError::Engine { .. }) = self.failure {
            self.diagnostic_output.extend_from_slice(&bytes);
            return false;
        }
        let exit = match self.engine {
            EngineState::Exited(exit) => Some(exit),
            _ => None,
        };
        let failed = self.fail(BridgeError::Engine {
            exit,
            diagnostics: String::new(),
        });
        if failed {
            self.diagnostic_output = bytes;
        }
        failed
    }

    fn engine_exited(&mut self, exit: EngineExit) -> bool {
        self.engine = EngineState::Exited(exit);

        // A signal after our own kill says nothing about the engine itself
        let self_inflicted = self.kill_requested && !exit.is_success();

        if let Some(BridgeError::Engine { exit: slot, .. }) = self.failure.as_mut() {
            if slot.is_none() && !matches!((self_inflicted, exit), (true, EngineExit::Signal(_))) {
                *slot = Some(exit);
            }
            return false;
        }
        if exit.is_success() || self_inflicted {
            return false;
        }
        self.fail(BridgeError::Engine {
            exit: Some(exit),
            diagnostics: String::new(),
        })
    }

    fn begin_teardown(&mut self) -> bool {
        if self.torn_down {
            return false;
        }
        self.torn_down = true;
        self.settle_source(SourceState::TornDown);
        if self.output == OutputState::Streaming {
            self.output = OutputState::Detached;
        }
        // An engine whose exit could not be observed may still be alive
        self.kill_requested = matches!(self.engine, EngineState::Running | EngineState::Lost);
        true
    }

    fn settled(&self) -> bool {
        let engine_done =
            self.engine != EngineState::Running && self.diagnostics == DiagnosticState::Drained;
        self.source != SourceState::Streaming
            && engine_done
            && self.output != OutputState::Streaming
    }

    fn try_finish(&mut self) -> Option<Completion> {
        if self.finished || !self.settled() {
            return None;
        }
        self.finished = true;
        Some(match self.failure.take() {
            Some(BridgeError::Engine { exit, .. }) => Completion::Failed(BridgeError::Engine {
                exit,
                diagnostics: String::from_utf8_lossy(&self.diagnostic_output).into_owned(),
            }),
            Some(err) => Completion::Failed(err),
            None if self.cancelled => Completion::Cancelled,
            None => Completion::Completed,
        })
    }
}
