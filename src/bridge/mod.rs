//! Bridge core - pairs one connection with one stream endpoint.
//!
//! A [`Bridge`] owns transport A (a [`UdpConnection`]) and transport B
//! (a [`StreamEndpoint`]) and reacts to their events:
//!
//! ```text
//! connection read ──► stream output ──► socket peer
//! socket peer ──► stream input ──► connection send (≤ max_chunk per call)
//! ```
//!
//! The bridge never performs I/O itself and has no scheduler. Whoever
//! delivers events (see [`crate::driver`]) owns the bridge and must drop
//! it once a transition returns [`Status::Finished`].
//!
//! Each side is held as an `Option`: an absent handle means that side has
//! been closed and nothing may target it again.

use std::sync::Arc;

use tracing::error;

use crate::config::BridgeConfig;
use crate::event::Direction;
use crate::transport::{ConnectNotify, StreamEndpoint, UdpConnection};

mod flow;
mod lifecycle;
mod shutdown;

#[cfg(test)]
pub(crate) mod mock;

/// Result of delivering an event to a bridge.
#[must_use = "a finished bridge must be dropped by its owner"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// At least one side is still open.
    Active,
    /// Both sides are closed. The bridge must not receive further events.
    Finished,
}

impl Status {
    /// Check whether the bridge is finished.
    #[inline]
    pub fn is_finished(self) -> bool {
        self == Status::Finished
    }
}

/// Coarse lifecycle phase, derived from which handles are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Both sides open.
    Open,
    /// Both sides open, no further connection data will be forwarded.
    ReadSuspended,
    /// Connection closed, stream still winding down.
    ConnectionClosed,
    /// Stream closed, connection still open.
    StreamClosed,
    /// Both sides closed.
    Closed,
}

/// Per-bridge counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Bytes accepted by the connection's send primitive.
    pub bytes_to_connection: u64,
    /// Bytes queued into the stream's output buffer.
    pub bytes_to_stream: u64,
    /// Connection bytes dropped because the stream could not accept them.
    pub bytes_dropped: u64,
    /// Internal-error reports (closing with data, double close, late events).
    pub invariant_violations: u64,
}

/// Shared reference to the far end of a loopback pair.
///
/// Dropping it tells the far end the bridge let go.
struct PeerRef(Arc<dyn ConnectNotify>);

impl Drop for PeerRef {
    fn drop(&mut self) {
        self.0.detached();
    }
}

/// One bridged connection.
pub struct Bridge<C: UdpConnection, S: StreamEndpoint> {
    conn: Option<C>,
    stream: Option<S>,
    peer: Option<PeerRef>,
    /// Set once connection data can no longer be propagated. Never cleared.
    read_suspended: bool,
    finished: bool,
    max_chunk: usize,
    stats: BridgeStats,
}

impl<C: UdpConnection, S: StreamEndpoint> Bridge<C, S> {
    /// Pair a connection with a stream endpoint.
    ///
    /// Both stream directions are enabled.
    pub fn new(conn: C, mut stream: S, config: &BridgeConfig) -> Self {
        stream.enable(Direction::BOTH);
        Self {
            conn: Some(conn),
            stream: Some(stream),
            peer: None,
            read_suspended: false,
            finished: false,
            max_chunk: config.max_chunk.max(1),
            stats: BridgeStats::default(),
        }
    }

    /// Attach the far end of a loopback pair, to be told when the
    /// connection connects.
    pub fn with_peer(mut self, peer: Arc<dyn ConnectNotify>) -> Self {
        self.peer = Some(PeerRef(peer));
        self
    }

    /// The connection, if still open.
    pub fn connection(&self) -> Option<&C> {
        self.conn.as_ref()
    }

    /// The stream endpoint, if still open.
    pub fn stream(&self) -> Option<&S> {
        self.stream.as_ref()
    }

    /// Mutable access to the stream endpoint, if still open.
    pub fn stream_mut(&mut self) -> Option<&mut S> {
        self.stream.as_mut()
    }

    /// Whether a paired endpoint is still waiting for the connect notification.
    pub fn has_peer(&self) -> bool {
        self.peer.is_some()
    }

    /// Whether connection data propagation has been suspended.
    pub fn is_read_suspended(&self) -> bool {
        self.read_suspended
    }

    /// Whether both sides are closed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Counters for this bridge.
    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        match (&self.conn, &self.stream) {
            (Some(_), Some(_)) if self.read_suspended => Phase::ReadSuspended,
            (Some(_), Some(_)) => Phase::Open,
            (None, Some(_)) => Phase::ConnectionClosed,
            (Some(_), None) => Phase::StreamClosed,
            (None, None) => Phase::Closed,
        }
    }

    /// Record an internal error. Panics in debug builds; release builds
    /// log and let the caller force teardown.
    fn report_violation(&mut self, what: &str) {
        self.stats.invariant_violations += 1;
        error!(violation = what, "bridge invariant violated");
        debug_assert!(false, "bridge invariant violated: {what}");
    }
}

impl<C: UdpConnection, S: StreamEndpoint> std::fmt::Debug for Bridge<C, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("phase", &self.phase())
            .field("read_suspended", &self.read_suspended)
            .field("has_peer", &self.peer.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{connection, stream, CountingNotify};
    use super::*;

    #[test]
    fn test_new_enables_both_directions() {
        let (conn, _) = connection();
        let (s, _) = stream();
        let bridge = Bridge::new(conn, s, &BridgeConfig::default());

        assert_eq!(bridge.stream().unwrap().enabled, Direction::BOTH);
        assert_eq!(bridge.phase(), Phase::Open);
        assert!(!bridge.is_read_suspended());
        assert!(!bridge.is_finished());
    }

    #[test]
    fn test_zero_chunk_is_clamped() {
        let (conn, conn_log) = connection();
        let (s, _) = stream();
        let config = BridgeConfig::new().with_max_chunk(0);
        let mut bridge = Bridge::new(conn, s, &config);

        bridge.stream_mut().unwrap().input.extend_from_slice(b"ab");
        let _ = bridge.on_stream_event(crate::StreamEvent::Readable);

        assert_eq!(conn_log.borrow().sends, vec![1, 1]);
    }

    #[test]
    fn test_dropping_bridge_detaches_peer() {
        let (conn, _) = connection();
        let (s, _) = stream();
        let notify = Arc::new(CountingNotify::default());
        let bridge = Bridge::new(conn, s, &BridgeConfig::default()).with_peer(notify.clone());
        assert!(bridge.has_peer());

        drop(bridge);
        assert_eq!(notify.connected_count(), 0);
        assert_eq!(notify.detached_count(), 1);
        assert_eq!(Arc::strong_count(&notify), 1);
    }
}
