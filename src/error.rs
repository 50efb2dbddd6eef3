//! Error types for utp-bridge.

use thiserror::Error;

/// Main error type for bridge construction and configuration.
///
/// Transport failures that happen after a bridge is running are not
/// surfaced here: they show up as the two endpoints reaching their
/// closed/error states.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// I/O error while creating or wiring a socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON deserialization error (configuration only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration rejected by validation.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Outbound stream connect failed before the bridge could start.
    #[error("Outbound connect to {addr} failed: {source}")]
    Connect {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The bridge has already been torn down.
    #[error("Bridge closed")]
    BridgeClosed,
}

/// Result type alias using BridgeError.
pub type Result<T> = std::result::Result<T, BridgeError>;
