//! Archive sources: random access readers and a forward stream over a byte
//! range of one.

mod local;
mod memory;
mod range;

pub use local::LocalFileReader;
pub use memory::MemoryReader;
pub use range::RangeStream;

use anyhow::Result;
use async_trait::async_trait;

/// Positional reads over an archive held in a file or in memory
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read up to `buf.len()` bytes starting at `offset`.
    ///
    /// Short reads are allowed; `Ok(0)` means `offset` is at or past the end.
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Total size of the source in bytes
    fn size(&self) -> u64;
}
