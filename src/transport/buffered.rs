//! Tokio-backed buffered stream endpoint.
//!
//! [`BufferedStream`] keeps an input and an output buffer in front of a
//! non-blocking socket and turns socket readiness into [`StreamEvent`]s:
//!
//! - read `0` bytes: read interest disabled, `Eof(READ)`
//! - read error: read interest disabled, `Error(READ)`
//! - output fully written: `WriteDrained`
//! - write `BrokenPipe` or `0` bytes: write interest disabled, `Eof(WRITE)`
//! - other write error: write interest disabled, `Error(WRITE)`
//!
//! The socket is read only while read interest is enabled and the input
//! buffer is below the configured high-watermark, so a connection that
//! refuses data pushes back on the socket's peer.

use std::io;
use std::net::Shutdown;

use bytes::{Buf, BytesMut};
use socket2::SockRef;
use tokio::io::{Interest, Ready};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tracing::{debug, trace};

use super::StreamEndpoint;
use crate::config::BridgeConfig;
use crate::event::{Direction, StreamEvent};

enum Socket {
    #[cfg(unix)]
    Unix(UnixStream),
    Tcp(TcpStream),
    /// Outbound connect still in progress.
    Connecting,
}

impl Socket {
    async fn ready(&self, interest: Interest) -> io::Result<Ready> {
        match self {
            #[cfg(unix)]
            Socket::Unix(s) => s.ready(interest).await,
            Socket::Tcp(s) => s.ready(interest).await,
            Socket::Connecting => std::future::pending().await,
        }
    }

    fn try_read_buf(&self, buf: &mut BytesMut) -> io::Result<usize> {
        match self {
            #[cfg(unix)]
            Socket::Unix(s) => s.try_read_buf(buf),
            Socket::Tcp(s) => s.try_read_buf(buf),
            Socket::Connecting => Err(io::ErrorKind::WouldBlock.into()),
        }
    }

    fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
        match self {
            #[cfg(unix)]
            Socket::Unix(s) => s.try_write(buf),
            Socket::Tcp(s) => s.try_write(buf),
            Socket::Connecting => Err(io::ErrorKind::WouldBlock.into()),
        }
    }

    fn shutdown_write(&self) -> io::Result<()> {
        match self {
            #[cfg(unix)]
            Socket::Unix(s) => SockRef::from(s).shutdown(Shutdown::Write),
            Socket::Tcp(s) => SockRef::from(s).shutdown(Shutdown::Write),
            Socket::Connecting => Ok(()),
        }
    }
}

/// A socket with input/output buffers and per-direction interest.
pub struct BufferedStream {
    socket: Socket,
    input: BytesMut,
    output: BytesMut,
    enabled: Direction,
    read_capacity: usize,
    high_watermark: usize,
}

impl BufferedStream {
    fn with_socket(socket: Socket, config: &BridgeConfig) -> Self {
        Self {
            socket,
            input: BytesMut::with_capacity(config.read_capacity),
            output: BytesMut::new(),
            enabled: Direction::NONE,
            read_capacity: config.read_capacity.max(1),
            high_watermark: config.read_high_watermark,
        }
    }

    /// Wrap a connected Unix stream.
    #[cfg(unix)]
    pub fn unix(stream: UnixStream, config: &BridgeConfig) -> Self {
        Self::with_socket(Socket::Unix(stream), config)
    }

    /// Wrap a connected TCP stream.
    pub fn tcp(stream: TcpStream, config: &BridgeConfig) -> Self {
        Self::with_socket(Socket::Tcp(stream), config)
    }

    /// A stream whose TCP connect has not completed yet.
    ///
    /// Data written before [`attach_tcp`](Self::attach_tcp) stays queued.
    pub fn connecting(config: &BridgeConfig) -> Self {
        Self::with_socket(Socket::Connecting, config)
    }

    /// Install the socket of a completed outbound connect.
    pub fn attach_tcp(&mut self, stream: TcpStream) {
        self.socket = Socket::Tcp(stream);
    }

    /// The outbound connect failed: nothing can be read or written.
    pub fn connect_failed(&mut self) {
        self.enabled = Direction::NONE;
    }

    /// Whether an outbound connect is still in progress.
    pub fn is_connecting(&self) -> bool {
        matches!(self.socket, Socket::Connecting)
    }

    fn wants(&self) -> Option<Interest> {
        let read = self.enabled.contains(Direction::READ) && self.input.len() < self.high_watermark;
        let write = self.enabled.contains(Direction::WRITE) && !self.output.is_empty();
        match (read, write) {
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }

    /// Wait until the socket is ready for a direction this stream wants.
    ///
    /// Never resolves while nothing is wanted.
    pub async fn ready(&self) -> io::Result<Ready> {
        match self.wants() {
            Some(interest) => self.socket.ready(interest).await,
            None => std::future::pending().await,
        }
    }

    /// Perform the non-blocking I/O `ready` allows and report what happened.
    pub fn on_ready(&mut self, ready: Ready) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let wants = self.wants();
        let wants_read = wants.map_or(false, |i| i.is_readable());
        let wants_write = wants.map_or(false, |i| i.is_writable());

        // A terminal read event ends the batch; the bridge must see it while
        // the write side is still as it was.
        if wants_read
            && (ready.is_readable() || ready.is_read_closed())
            && !self.read_some(&mut events)
        {
            return events;
        }
        if wants_write && (ready.is_writable() || ready.is_write_closed()) {
            self.write_some(&mut events);
        }
        events
    }

    /// The socket reported an error while waiting for readiness.
    pub fn on_ready_error(&mut self, err: &io::Error) -> Vec<StreamEvent> {
        debug!(error = %err, "stream readiness failed");
        self.enabled = Direction::NONE;
        vec![StreamEvent::Error(Direction::BOTH)]
    }

    /// Returns false once the read side has ended.
    fn read_some(&mut self, events: &mut Vec<StreamEvent>) -> bool {
        self.input.reserve(self.read_capacity);
        match self.socket.try_read_buf(&mut self.input) {
            Ok(0) => {
                self.enabled = self.enabled.without(Direction::READ);
                events.push(StreamEvent::Eof(Direction::READ));
                false
            }
            Ok(n) => {
                trace!(bytes = n, buffered = self.input.len(), "stream read");
                events.push(StreamEvent::Readable);
                true
            }
            Err(e) if is_transient(&e) => true,
            Err(e) => {
                debug!(error = %e, "stream read failed");
                self.enabled = self.enabled.without(Direction::READ);
                events.push(StreamEvent::Error(Direction::READ));
                false
            }
        }
    }

    fn write_some(&mut self, events: &mut Vec<StreamEvent>) {
        match self.socket.try_write(&self.output) {
            Ok(0) => {
                self.enabled = self.enabled.without(Direction::WRITE);
                events.push(StreamEvent::Eof(Direction::WRITE));
            }
            Ok(n) => {
                self.output.advance(n);
                trace!(bytes = n, remaining = self.output.len(), "stream write");
                if self.output.is_empty() {
                    events.push(StreamEvent::WriteDrained);
                }
            }
            Err(e) if is_transient(&e) => {}
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!("stream peer stopped reading");
                self.enabled = self.enabled.without(Direction::WRITE);
                events.push(StreamEvent::Eof(Direction::WRITE));
            }
            Err(e) => {
                debug!(error = %e, "stream write failed");
                self.enabled = self.enabled.without(Direction::WRITE);
                events.push(StreamEvent::Error(Direction::WRITE));
            }
        }
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

impl StreamEndpoint for BufferedStream {
    fn enabled(&self) -> Direction {
        self.enabled
    }

    fn enable(&mut self, dir: Direction) {
        self.enabled = self.enabled | dir;
    }

    fn disable(&mut self, dir: Direction) {
        self.enabled = self.enabled.without(dir);
    }

    fn input(&mut self) -> &mut BytesMut {
        &mut self.input
    }

    fn output(&mut self) -> &mut BytesMut {
        &mut self.output
    }

    fn shutdown_write(&mut self) {
        if let Err(e) = self.socket.shutdown_write() {
            debug!(error = %e, "stream half-close failed");
        }
    }

    fn close(self) {
        drop(self);
    }
}

impl std::fmt::Debug for BufferedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedStream")
            .field("enabled", &self.enabled)
            .field("input", &self.input.len())
            .field("output", &self.output.len())
            .field("connecting", &self.is_connecting())
            .finish()
    }
}
