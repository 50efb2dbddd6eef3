//! Bridge configuration.
//!
//! All fields have defaults tuned for a uTP-style transport whose send
//! primitive takes at most one path-MTU sized chunk per call.
//!
//! # Example
//!
//! ```
//! use utp_bridge::BridgeConfig;
//!
//! let config = BridgeConfig::from_json(r#"{ "read_high_watermark": 131072 }"#).unwrap();
//! assert_eq!(config.max_chunk, 1500);
//! assert_eq!(config.read_high_watermark, 128 * 1024);
//! ```

use serde::Deserialize;

use crate::error::{BridgeError, Result};

/// Largest chunk handed to the connection's send primitive in one call.
pub const DEFAULT_MAX_CHUNK: usize = 1500;

/// Stop reading from the stream once this many bytes are waiting to be sent.
pub const DEFAULT_READ_HIGH_WATERMARK: usize = 64 * 1024;

/// Initial capacity reserved for each stream read.
pub const DEFAULT_READ_CAPACITY: usize = 16 * 1024;

/// Configuration for a bridge and its buffered stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Maximum bytes submitted to the connection per send call.
    pub max_chunk: usize,
    /// Input-buffer size above which the stream stops reading its socket.
    pub read_high_watermark: usize,
    /// Capacity reserved in the input buffer before each socket read.
    pub read_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_chunk: DEFAULT_MAX_CHUNK,
            read_high_watermark: DEFAULT_READ_HIGH_WATERMARK,
            read_capacity: DEFAULT_READ_CAPACITY,
        }
    }
}

impl BridgeConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the maximum chunk size.
    pub fn with_max_chunk(mut self, max_chunk: usize) -> Self {
        self.max_chunk = max_chunk;
        self
    }

    /// Set the read high-watermark.
    pub fn with_read_high_watermark(mut self, watermark: usize) -> Self {
        self.read_high_watermark = watermark;
        self
    }

    /// Set the per-read capacity.
    pub fn with_read_capacity(mut self, capacity: usize) -> Self {
        self.read_capacity = capacity;
        self
    }

    /// Check the configuration for values the bridge cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk == 0 {
            return Err(BridgeError::Config("max_chunk must be non-zero".into()));
        }
        if self.read_capacity == 0 {
            return Err(BridgeError::Config("read_capacity must be non-zero".into()));
        }
        if self.read_high_watermark < self.max_chunk {
            return Err(BridgeError::Config(format!(
                "read_high_watermark ({}) must be at least max_chunk ({})",
                self.read_high_watermark, self.max_chunk
            )));
        }
        Ok(())
    }
}
