//! Transport module - the two collaborators a bridge sits between.
//!
//! - [`UdpConnection`]: the reliable, ordered, UDP-carried connection
//!   (transport A). Its wire protocol lives outside this crate.
//! - [`StreamEndpoint`]: a duplex byte stream with input/output buffers
//!   and per-direction interest (transport B).
//! - [`ConnectNotify`]: the consumer side of a loopback pair, told when
//!   transport A finishes connecting.
//!
//! [`BufferedStream`] is the tokio-backed stream endpoint used by the
//! factories; [`loopback`] builds the socket pairs it runs on.

use std::net::Shutdown;

use bytes::BytesMut;

use crate::event::{ConnectionStats, Direction};

mod buffered;
#[cfg(unix)]
pub mod loopback;

pub use buffered::BufferedStream;
#[cfg(unix)]
pub use loopback::{LinkState, PairedStream, PeerLink};

/// The UDP-carried reliable connection (transport A).
///
/// Implementations wrap a connection owned by an external protocol
/// library. The bridge holds the only handle; closing consumes it.
pub trait UdpConnection {
    /// Submit outbound data without blocking.
    ///
    /// Returns the number of bytes accepted, which may be less than
    /// `buf.len()`. `Ok(0)` means the connection is applying backpressure
    /// and a later [`ConnectionEvent::Writable`](crate::ConnectionEvent::Writable)
    /// will follow. `Err` is fatal for the connection.
    fn send(&mut self, buf: &[u8]) -> std::io::Result<usize>;

    /// Half-close one direction. Must tolerate repeated calls.
    fn shutdown(&mut self, how: Shutdown);

    /// Acknowledge that all previously delivered data has been consumed
    /// downstream, letting the connection advance its receive window.
    fn read_drained(&mut self);

    /// Detach from the bridge and tear the connection down.
    ///
    /// After this returns the connection must not deliver further events
    /// to the bridge.
    fn close(self);

    /// End-of-connection statistics, if the library keeps them.
    fn stats(&self) -> Option<ConnectionStats> {
        None
    }
}

/// A buffered duplex byte stream (transport B).
pub trait StreamEndpoint {
    /// Directions currently enabled.
    fn enabled(&self) -> Direction;

    /// Enable interest in the given directions.
    fn enable(&mut self, dir: Direction);

    /// Disable interest in the given directions.
    fn disable(&mut self, dir: Direction);

    /// Bytes read from the stream and not yet consumed.
    fn input(&mut self) -> &mut BytesMut;

    /// Bytes queued for writing to the stream.
    fn output(&mut self) -> &mut BytesMut;

    /// Half-close the write side of the underlying socket.
    fn shutdown_write(&mut self);

    /// Release the endpoint and close any underlying descriptor.
    fn close(self);

    /// Queue bytes for writing.
    fn write(&mut self, data: &[u8]) {
        self.output().extend_from_slice(data);
    }
}

/// Receiver of the synthetic "connected" notification for the far end
/// of a loopback pair.
pub trait ConnectNotify: Send + Sync {
    /// Transport A has connected.
    fn connected(&self);

    /// The bridge released its reference. Called after [`connected`]
    /// too, so implementations must ignore it once connected.
    ///
    /// [`connected`]: ConnectNotify::connected
    fn detached(&self) {}
}
