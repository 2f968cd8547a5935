//! Decoding of entries through an external engine.
//!
//! The bridge re-frames an entry's raw payload as a one-entry archive (a
//! synthesized local file header followed by the payload bytes), pipes it
//! into a decoding engine such as `funzip`, and exposes the engine's output
//! as a single [`BridgeStream`].
//!
//! ## Components
//!
//! - [`header`]: local file header synthesis, ZIP64 block included
//! - [`engine`]: spawning and killing the engine process
//! - `state`: the completion reducer joining source, engine and output
//! - `stream`: the driver task and the consumer-facing stream
//! - [`routing`]: per-read routing and the [`BridgedReader`] decorator
//!
//! ## Engine contract
//!
//! The engine runs with no arguments. Its stdin receives the header and the
//! payload, nothing else. Its stdout carries decoded bytes. Anything written
//! to its stderr fails the stream, whatever the exit status.

mod config;
pub mod engine;
mod error;
pub mod header;
pub mod routing;
mod state;
mod stream;

pub use config::{BRIDGE_DEFAULT, BRIDGE_FORCE_ALL, BridgeConfig, DEFAULT_ENGINE};
pub use error::{BridgeError, EngineExit};
pub use header::synthesize_header;
pub use routing::{BridgedReader, Route, route};
pub use stream::{BridgeStream, open};
