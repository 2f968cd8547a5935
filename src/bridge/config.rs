use std::path::PathBuf;
use std::time::Duration;

use crate::zip::CompressionMethod;

/// Engine used when none is configured; resolved through `PATH`
pub const DEFAULT_ENGINE: &str = "funzip";

/// Methods bridged by default: the ones the native reader cannot decode
pub const BRIDGE_DEFAULT: &[CompressionMethod] = &[CompressionMethod::Deflate64];

/// Also route Deflate through the engine, bypassing the native decoder
pub const BRIDGE_FORCE_ALL: &[CompressionMethod] =
    &[CompressionMethod::Deflate64, CompressionMethod::Deflate];

/// Settings for bridging entries through an external decoding engine.
///
/// Passed explicitly to every reader or bridge that needs it; there is no
/// process-wide default beyond [`BridgeConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Compression methods routed through the engine
    pub methods: Vec<CompressionMethod>,
    /// Engine executable, spawned with no arguments
    pub engine_path: PathBuf,
    /// Give up on an engine that has not finished within this time
    pub engine_timeout: Option<Duration>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            methods: BRIDGE_DEFAULT.to_vec(),
            engine_path: PathBuf::from(DEFAULT_ENGINE),
            engine_timeout: None,
        }
    }
}

impl BridgeConfig {
    pub fn force_all() -> Self {
        Self::default().with_methods(BRIDGE_FORCE_ALL)
    }

    /// Configuration that never bridges
    pub fn disabled() -> Self {
        Self::default().with_methods(&[])
    }

    pub fn with_methods(mut self, methods: &[CompressionMethod]) -> Self {
        self.methods = methods.to_vec();
        self
    }

    pub fn with_engine_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.engine_path = path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.engine_timeout = Some(timeout);
        self
    }

    pub fn bridges(&self, method: CompressionMethod) -> bool {
        self.methods.contains(&method)
    }
}
