//! Events delivered to a bridge by its two transports.
//!
//! Transport A (the UDP-carried connection) and transport B (the stream
//! endpoint) each report their callbacks as one closed set of variants.
//! A bridge handles each set through a single transition function.

use std::fmt;
use std::ops::BitOr;

use bytes::Bytes;

/// Set of stream directions: read, write, both, or neither.
///
/// Used both for enabled interest on a stream endpoint and for the
/// directional flags carried by stream EOF/error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Direction(u8);

impl Direction {
    /// No direction.
    pub const NONE: Direction = Direction(0);
    /// Read direction (data flowing into the endpoint's input buffer).
    pub const READ: Direction = Direction(0b01);
    /// Write direction (data flowing out of the endpoint's output buffer).
    pub const WRITE: Direction = Direction(0b10);
    /// Both directions.
    pub const BOTH: Direction = Direction(0b11);

    /// Check whether every direction in `other` is set.
    #[inline]
    pub fn contains(self, other: Direction) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    /// Check whether no direction is set.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Directions set in `self` but not in `other`.
    #[inline]
    pub fn without(self, other: Direction) -> Direction {
        Direction(self.0 & !other.0)
    }
}

impl BitOr for Direction {
    type Output = Direction;

    fn bitor(self, rhs: Direction) -> Direction {
        Direction(self.0 | rhs.0)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Direction::NONE => f.write_str("none"),
            Direction::READ => f.write_str("read"),
            Direction::WRITE => f.write_str("write"),
            _ => f.write_str("read|write"),
        }
    }
}

/// Error codes reported by the UDP-carried connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionError {
    /// The remote end refused the connection.
    ConnectionRefused,
    /// The remote end reset the connection.
    ConnectionReset,
    /// The connection timed out.
    TimedOut,
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionError::ConnectionRefused => "ECONNREFUSED",
            ConnectionError::ConnectionReset => "ECONNRESET",
            ConnectionError::TimedOut => "ETIMEDOUT",
        };
        f.write_str(name)
    }
}

/// End-of-connection statistics reported by the UDP-carried connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_received: u64,
    pub packets_sent: u64,
    pub duplicate_receives: u64,
    pub retransmits: u64,
    pub fast_retransmits: u64,
    /// Best guess at the path MTU.
    pub mtu_guess: u32,
}

/// Callback delivered by the UDP-carried connection (transport A).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The connection finished its handshake.
    Connected,
    /// The connection can accept more outbound data.
    Writable,
    /// Data arrived from the remote end.
    Read(Bytes),
    /// The remote end will send no more data.
    Eof,
    /// The connection failed.
    Error(ConnectionError),
    /// The connection is about to be freed by its library.
    Destroying,
}

impl ConnectionEvent {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionEvent::Connected => "connected",
            ConnectionEvent::Writable => "writable",
            ConnectionEvent::Read(_) => "read",
            ConnectionEvent::Eof => "eof",
            ConnectionEvent::Error(_) => "error",
            ConnectionEvent::Destroying => "destroying",
        }
    }
}

/// Callback delivered by the stream endpoint (transport B).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    /// New data is waiting in the input buffer.
    Readable,
    /// The output buffer has been fully written.
    WriteDrained,
    /// An outbound connect completed.
    Connected,
    /// End of stream on the given directions.
    Eof(Direction),
    /// I/O failure on the given directions.
    Error(Direction),
}
