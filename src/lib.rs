//! # zipbridge
//!
//! A ZIP reader that decodes entries its native decoder cannot handle
//! (Deflate64 by default) by handing them to an external decoding engine
//! such as `funzip`.
//!
//! For a bridged entry the raw payload is prefixed with a synthesized
//! one-entry local file header and piped into the engine; the engine's output
//! becomes the entry's decoded stream. Any failure along the way (engine
//! missing, abnormal exit, diagnostic output, unreadable source) ends the
//! stream with exactly one error after the engine and source are released.
//!
//! ## Features
//!
//! - Central directory parsing with ZIP64 support
//! - Native STORED and DEFLATE decoding with CRC-32 verification
//! - Raw payload streams for every method
//! - Deflate64 (or any configured method) through an external engine
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use tokio::io::AsyncReadExt;
//! use zipbridge::{BridgeConfig, BridgedReader, EntryReader, LocalFileReader, ReadOptions, ZipArchive};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let file = Arc::new(LocalFileReader::new(Path::new("archive.zip"))?);
//!     let reader = BridgedReader::new(ZipArchive::new(file), BridgeConfig::default());
//!
//!     for entry in reader.list_files().await? {
//!         let mut stream = reader.open_read_stream(&entry, &ReadOptions::default()).await?;
//!         let mut data = Vec::new();
//!         stream.read_to_end(&mut data).await?;
//!         println!("{}: {} bytes", entry.file_name, data.len());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod cli;
pub mod io;
pub mod zip;

pub use bridge::{BridgeConfig, BridgeError, BridgeStream, BridgedReader};
pub use cli::Cli;
pub use io::{LocalFileReader, MemoryReader, ReadAt};
pub use zip::{EntryMetadata, EntryReader, ReadOptions, ZipArchive, ZipFileEntry};
