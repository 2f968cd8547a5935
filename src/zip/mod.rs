//! ZIP archive parsing and entry reading.
//!
//! - [`structures`]: ZIP format records (EOCD, ZIP64 records, entries)
//! - [`parser`]: low-level parsing of those records from a [`ReadAt`](crate::io::ReadAt) source
//! - [`archive`]: the base [`EntryReader`] serving raw, stored and deflated entries
//!
//! The central directory is read from the end of the archive, so listing an
//! archive never touches entry payloads.
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions for files > 4GB
//! - STORED and DEFLATE decoding, with CRC-32 and size verification
//! - Raw (still compressed) streams for every method
//!
//! Other methods, Deflate64 included, are decoded by wrapping a reader in
//! [`BridgedReader`](crate::bridge::BridgedReader).
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support

mod archive;
mod inflate;
mod parser;
mod structures;

pub use archive::{EntryReader, EntryStream, ReadOptions, ZipArchive, extract_to_file, extract_to_writer};
pub use parser::ZipParser;
pub use structures::*;
