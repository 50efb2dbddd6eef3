//! Loopback socket pairs.
//!
//! A bridge built for a local consumer runs on one end of a Unix socket
//! pair; the consumer gets the other end, either as a raw descriptor or as
//! a [`PairedStream`] that can wait for the connection to come up.
//!
//! # Example
//!
//! ```ignore
//! let (stream, handle) = utp_bridge::create_stream_bridge(&runtime, conn, &config)?;
//! if stream.connected().await == LinkState::Connected {
//!     // talk to the remote peer through `stream`
//! }
//! ```

use std::io;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::UnixStream;
use tokio::sync::watch;

use super::ConnectNotify;

/// Create a connected socket pair.
///
/// Both descriptors are close-on-exec. The first (bridge) end is switched
/// to non-blocking mode; the second is left as created for the consumer.
pub fn socket_pair() -> io::Result<(StdUnixStream, StdUnixStream)> {
    let (near, far) = StdUnixStream::pair()?;
    near.set_nonblocking(true)?;
    Ok((near, far))
}

/// What the consumer end knows about the bridged connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// The connection has not connected yet.
    Pending,
    /// The connection connected.
    Connected,
    /// The bridge went away without the connection ever connecting.
    Detached,
}

/// Shared state between a bridge and the consumer end of its pair.
#[derive(Debug)]
pub struct PeerLink {
    state: watch::Sender<LinkState>,
}

impl PeerLink {
    pub fn new() -> Self {
        let (state, _) = watch::channel(LinkState::Pending);
        Self { state }
    }

    /// Current state.
    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    /// Wait until the state leaves [`LinkState::Pending`].
    pub async fn wait(&self) -> LinkState {
        let mut rx = self.state.subscribe();
        let state = match rx.wait_for(|state| *state != LinkState::Pending).await {
            Ok(state) => *state,
            Err(_) => LinkState::Detached,
        };
        state
    }
}

impl Default for PeerLink {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectNotify for PeerLink {
    fn connected(&self) {
        self.state.send_replace(LinkState::Connected);
    }

    fn detached(&self) {
        self.state.send_if_modified(|state| {
            if *state == LinkState::Pending {
                *state = LinkState::Detached;
                true
            } else {
                false
            }
        });
    }
}

/// Consumer end of a bridged socket pair.
///
/// Reads yield data received on the connection; writes are sent over it.
pub struct PairedStream {
    stream: UnixStream,
    link: Arc<PeerLink>,
}

impl PairedStream {
    pub(crate) fn new(stream: UnixStream, link: Arc<PeerLink>) -> Self {
        Self { stream, link }
    }

    /// Wait for the connection to connect, or for the bridge to give up.
    pub async fn connected(&self) -> LinkState {
        self.link.wait().await
    }

    /// Connection state as last reported by the bridge.
    pub fn link_state(&self) -> LinkState {
        self.link.state()
    }

    /// Split into read and write halves.
    pub fn into_split(self) -> (impl AsyncRead, impl AsyncWrite) {
        self.stream.into_split()
    }

    /// Get a reference to the underlying stream.
    pub fn inner(&self) -> &UnixStream {
        &self.stream
    }

    /// Get a mutable reference to the underlying stream.
    pub fn inner_mut(&mut self) -> &mut UnixStream {
        &mut self.stream
    }

    /// Give up the link and keep only the socket.
    pub fn into_inner(self) -> UnixStream {
        self.stream
    }
}

impl std::fmt::Debug for PairedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairedStream")
            .field("link", &self.link_state())
            .finish()
    }
}

impl AsyncRead for PairedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for PairedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::os::fd::AsRawFd;

    use super::*;

    fn cloexec(fd: i32) -> bool {
        let path = format!("/proc/self/fdinfo/{fd}");
        let Ok(info) = std::fs::read_to_string(path) else {
            // No procfs: nothing to check against.
            return true;
        };
        info.lines()
            .find_map(|line| line.strip_prefix("flags:"))
            .and_then(|flags| u32::from_str_radix(flags.trim(), 8).ok())
            .map_or(true, |flags| flags & 0o2000000 != 0)
    }

    #[test]
    fn test_socket_pair_flags() {
        let (near, far) = socket_pair().unwrap();

        assert!(cloexec(near.as_raw_fd()));
        assert!(cloexec(far.as_raw_fd()));

        let mut buf = [0u8; 1];
        let err = std::io::Read::read(&mut &near, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[tokio::test]
    async fn test_link_connected() {
        let link = Arc::new(PeerLink::new());
        let waiter = {
            let link = link.clone();
            tokio::spawn(async move { link.wait().await })
        };

        link.connected();
        link.detached();

        assert_eq!(waiter.await.unwrap(), LinkState::Connected);
        assert_eq!(link.state(), LinkState::Connected);
    }

    #[tokio::test]
    async fn test_link_detached_without_connect() {
        let link = PeerLink::new();
        assert_eq!(link.state(), LinkState::Pending);

        link.detached();

        assert_eq!(link.wait().await, LinkState::Detached);
    }

    #[tokio::test]
    async fn test_paired_stream_delegates_io() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (near, far) = UnixStream::pair().unwrap();
        let mut paired = PairedStream::new(far, Arc::new(PeerLink::new()));
        let mut near = near;

        paired.write_all(b"hi").await.unwrap();
        let mut buf = [0u8; 2];
        near.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");

        near.write_all(b"yo").await.unwrap();
        paired.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"yo");
    }
}
