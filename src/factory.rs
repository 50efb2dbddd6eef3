//! Entry points that build a bridge and start its driver.
//!
//! Every factory takes ownership of the connection. If construction fails
//! the connection is closed before the error is returned, so the caller
//! never has to clean up after a failed call.

use std::net::SocketAddr;
#[cfg(unix)]
use std::os::fd::OwnedFd;
#[cfg(unix)]
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::task::noop_waker_ref;
use futures::FutureExt;
use tokio::net::TcpSocket;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use crate::driver::{self, BridgeHandle, ConnectFuture};
use crate::error::{BridgeError, Result};
#[cfg(unix)]
use crate::transport::loopback::{socket_pair, PairedStream, PeerLink};
use crate::transport::{BufferedStream, UdpConnection};

/// Run `build`, closing `conn` if it fails.
fn or_close<C, T>(conn: C, build: impl FnOnce() -> Result<T>) -> Result<(C, T)>
where
    C: UdpConnection,
{
    match build() {
        Ok(value) => Ok((conn, value)),
        Err(err) => {
            warn!(error = %err, "bridge construction failed, closing connection");
            conn.close();
            Err(err)
        }
    }
}

/// Bridge `conn` to one end of a new socket pair and return the other end.
///
/// The returned descriptor is an ordinary blocking stream socket: bytes
/// written to it are sent over the connection and bytes received on the
/// connection can be read from it.
#[cfg(unix)]
pub fn create_fd_bridge<C>(
    runtime: &Handle,
    conn: C,
    config: &BridgeConfig,
) -> Result<(OwnedFd, BridgeHandle)>
where
    C: UdpConnection + Send + 'static,
{
    let (conn, (stream, far)) = or_close(conn, || {
        config.validate()?;
        let (near, far) = socket_pair()?;
        let _guard = runtime.enter();
        let near = tokio::net::UnixStream::from_std(near)?;
        Ok((BufferedStream::unix(near, config), far))
    })?;

    let bridge = Bridge::new(conn, stream, config);
    let (handle, _task) = driver::spawn(runtime, bridge, None);
    debug!("descriptor bridge started");
    Ok((OwnedFd::from(far), handle))
}

/// Like [`create_fd_bridge`], but the far end comes back as a
/// [`PairedStream`] that can await the connection coming up.
#[cfg(unix)]
pub fn create_stream_bridge<C>(
    runtime: &Handle,
    conn: C,
    config: &BridgeConfig,
) -> Result<(PairedStream, BridgeHandle)>
where
    C: UdpConnection + Send + 'static,
{
    let (conn, (stream, far)) = or_close(conn, || {
        config.validate()?;
        let (near, far) = socket_pair()?;
        far.set_nonblocking(true)?;
        let _guard = runtime.enter();
        let near = tokio::net::UnixStream::from_std(near)?;
        let far = tokio::net::UnixStream::from_std(far)?;
        Ok((BufferedStream::unix(near, config), far))
    })?;

    let link = Arc::new(PeerLink::new());
    let bridge = Bridge::new(conn, stream, config).with_peer(link.clone());
    let (handle, _task) = driver::spawn(runtime, bridge, None);
    debug!("stream bridge started");
    Ok((PairedStream::new(far, link), handle))
}

/// Bridge `conn` to a TCP connection opened to `addr`.
///
/// The connect is started before this returns. If it fails at once (no
/// route, address not permitted) the connection is closed and
/// [`BridgeError::Connect`] is returned. Otherwise it completes in the
/// background; connection data that arrives first is queued, and a connect
/// that fails later tears the bridge down through the normal stream-error
/// path.
pub fn connect_outbound<C>(
    runtime: &Handle,
    conn: C,
    addr: SocketAddr,
    config: &BridgeConfig,
) -> Result<BridgeHandle>
where
    C: UdpConnection + Send + 'static,
{
    let (conn, connect) = or_close(conn, || {
        config.validate()?;
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(|source| BridgeError::Connect { addr, source })?;

        // First poll issues the connect call; the driver task re-polls with
        // its own waker.
        let _guard = runtime.enter();
        let mut connect: ConnectFuture = Box::pin(socket.connect(addr));
        match connect.poll_unpin(&mut Context::from_waker(noop_waker_ref())) {
            Poll::Ready(Err(source)) => Err(BridgeError::Connect { addr, source }),
            Poll::Ready(Ok(tcp)) => Ok(Box::pin(std::future::ready(Ok(tcp))) as ConnectFuture),
            Poll::Pending => Ok(connect),
        }
    })?;

    let bridge = Bridge::new(conn, BufferedStream::connecting(config), config);
    let (handle, _task) = driver::spawn(runtime, bridge, Some(connect));
    debug!(%addr, "outbound bridge started");
    Ok(handle)
}
