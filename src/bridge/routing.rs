use anyhow::Result;
use async_trait::async_trait;
use log::debug;

use super::config::BridgeConfig;
use super::stream;
use crate::zip::{CompressionMethod, EntryReader, EntryStream, ReadOptions, ZipFileEntry};

/// How one read of one entry is served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Decode through the external engine
    Bridge,
    /// Hand out the stored bytes unchanged
    Raw,
    /// Let the wrapped reader decode (or reject) the entry
    Native,
}

/// Decide how a read is served.
///
/// Bridging applies only to configured methods, when decoding is requested,
/// and when the whole entry is read.
pub fn route(config: &BridgeConfig, method: CompressionMethod, options: &ReadOptions) -> Route {
    if !options.decompress {
        return Route::Raw;
    }
    if config.bridges(method) && !options.is_ranged() {
        Route::Bridge
    } else {
        Route::Native
    }
}

/// Reader decorator that decodes configured methods through an external engine.
///
/// Everything else is forwarded to the wrapped reader untouched. For bridged
/// entries the wrapped reader is asked for the raw payload, so an entry is
/// never decoded twice, and neither the caller's entry nor its options are
/// modified.
pub struct BridgedReader<E: EntryReader> {
    inner: E,
    config: BridgeConfig,
}

impl<E: EntryReader> BridgedReader<E> {
    pub fn new(inner: E, config: BridgeConfig) -> Self {
        Self { inner, config }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

#[async_trait]
impl<E: EntryReader> EntryReader for BridgedReader<E> {
    async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        self.inner.list_files().await
    }

    async fn open_read_stream(
        &self,
        entry: &ZipFileEntry,
        options: &ReadOptions,
    ) -> Result<EntryStream> {
        match route(&self.config, entry.compression_method, options) {
            Route::Bridge => {
                debug!("bridging {}", entry.file_name);
                let raw_options = ReadOptions {
                    decompress: false,
                    ..*options
                };
                let raw = self.inner.open_read_stream(entry, &raw_options).await?;
                Ok(Box::pin(stream::open(entry.metadata(), raw, &self.config)))
            }
            Route::Raw | Route::Native => self.inner.open_read_stream(entry, options).await,
        }
    }
}
