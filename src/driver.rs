//! Runtime driver - one task per bridge.
//!
//! The driver task owns the [`Bridge`] and feeds it events from two
//! sources:
//!
//! - connection events posted through a [`BridgeHandle`] by whatever runs
//!   the UDP protocol
//! - readiness of the [`BufferedStream`] socket (and completion of an
//!   outbound connect, if one is pending)
//!
//! The task exits and drops the bridge as soon as a transition reports
//! [`Status::Finished`]. Once every handle is dropped while the connection
//! is still attached, the connection is treated as reset.

use std::future::Future;
use std::io;
use std::pin::Pin;

use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::bridge::{Bridge, Status};
use crate::error::{BridgeError, Result};
use crate::event::{ConnectionError, ConnectionEvent, Direction, StreamEvent};
use crate::transport::{BufferedStream, UdpConnection};

/// Maximum connection events handled before the stream gets a turn.
const MAX_EVENT_BATCH: usize = 64;

/// An outbound TCP connect still in flight.
pub(crate) type ConnectFuture = Pin<Box<dyn Future<Output = io::Result<TcpStream>> + Send>>;

/// Handle for delivering connection events to a running bridge.
///
/// This is what the UDP protocol layer keeps as its per-connection user
/// data. Cloning is cheap.
#[derive(Clone, Debug)]
pub struct BridgeHandle {
    tx: mpsc::UnboundedSender<ConnectionEvent>,
}

impl BridgeHandle {
    /// Deliver a connection event.
    ///
    /// Fails with [`BridgeError::BridgeClosed`] once the bridge has
    /// finished; the event is dropped in that case.
    pub fn post(&self, event: ConnectionEvent) -> Result<()> {
        self.tx.send(event).map_err(|_| BridgeError::BridgeClosed)
    }

    /// Check whether the bridge has finished.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Wait until the bridge finishes.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Spawn the driver task for `bridge` on `runtime`.
pub(crate) fn spawn<C>(
    runtime: &Handle,
    bridge: Bridge<C, BufferedStream>,
    connect: Option<ConnectFuture>,
) -> (BridgeHandle, JoinHandle<()>)
where
    C: UdpConnection + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let task = runtime.spawn(drive(bridge, rx, connect));
    (BridgeHandle { tx }, task)
}

enum Step {
    Connection(Option<ConnectionEvent>),
    Connect(io::Result<TcpStream>),
    Stream(io::Result<tokio::io::Ready>),
}

async fn drive<C>(
    mut bridge: Bridge<C, BufferedStream>,
    mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
    mut connect: Option<ConnectFuture>,
) where
    C: UdpConnection,
{
    let mut handles_alive = true;

    loop {
        let step = {
            let stream = bridge.stream();
            tokio::select! {
                event = events.recv(), if handles_alive => Step::Connection(event),
                result = pending_connect(&mut connect) => Step::Connect(result),
                ready = stream_ready(stream) => Step::Stream(ready),
            }
        };

        let status = match step {
            Step::Connection(Some(event)) => {
                let mut status = bridge.on_connection_event(event);
                let mut handled = 1;
                while !status.is_finished() && handled < MAX_EVENT_BATCH {
                    match events.try_recv() {
                        Ok(event) => status = bridge.on_connection_event(event),
                        Err(_) => break,
                    }
                    handled += 1;
                }
                status
            }
            Step::Connection(None) => {
                handles_alive = false;
                if bridge.connection().is_some() {
                    debug!("all bridge handles dropped, resetting connection");
                    bridge.on_connection_event(ConnectionEvent::Error(
                        ConnectionError::ConnectionReset,
                    ))
                } else {
                    Status::Active
                }
            }
            Step::Connect(result) => {
                connect = None;
                on_connect(&mut bridge, result)
            }
            Step::Stream(ready) => {
                let stream_events = match (bridge.stream_mut(), ready) {
                    (Some(stream), Ok(ready)) => stream.on_ready(ready),
                    (Some(stream), Err(err)) => stream.on_ready_error(&err),
                    (None, _) => Vec::new(),
                };
                dispatch(&mut bridge, stream_events)
            }
        };

        if status.is_finished() {
            break;
        }
    }

    debug!(stats = ?bridge.stats(), "bridge driver exiting");
}

fn on_connect<C: UdpConnection>(
    bridge: &mut Bridge<C, BufferedStream>,
    result: io::Result<TcpStream>,
) -> Status {
    let Some(stream) = bridge.stream_mut() else {
        return bridge.on_stream_event(StreamEvent::Connected);
    };
    match result {
        Ok(tcp) => {
            if let Err(err) = tcp.set_nodelay(true) {
                trace!(error = %err, "could not disable nagle");
            }
            stream.attach_tcp(tcp);
            bridge.on_stream_event(StreamEvent::Connected)
        }
        Err(err) => {
            debug!(error = %err, "outbound connect failed");
            stream.connect_failed();
            bridge.on_stream_event(StreamEvent::Error(Direction::BOTH))
        }
    }
}

fn dispatch<C: UdpConnection>(
    bridge: &mut Bridge<C, BufferedStream>,
    events: Vec<StreamEvent>,
) -> Status {
    for event in events {
        if bridge.on_stream_event(event).is_finished() {
            return Status::Finished;
        }
    }
    Status::Active
}

async fn pending_connect(connect: &mut Option<ConnectFuture>) -> io::Result<TcpStream> {
    match connect {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn stream_ready(stream: Option<&BufferedStream>) -> io::Result<tokio::io::Ready> {
    match stream {
        Some(stream) => stream.ready().await,
        None => std::future::pending().await,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::net::Shutdown;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixStream;

    use super::*;
    use crate::config::BridgeConfig;

    #[derive(Default)]
    struct Shared {
        sent: Vec<u8>,
        closed: bool,
    }

    struct SharedConnection(Arc<Mutex<Shared>>);

    impl UdpConnection for SharedConnection {
        fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().sent.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn shutdown(&mut self, _how: Shutdown) {}

        fn read_drained(&mut self) {}

        fn close(self) {
            self.0.lock().unwrap().closed = true;
        }
    }

    fn start() -> (BridgeHandle, JoinHandle<()>, UnixStream, Arc<Mutex<Shared>>) {
        let config = BridgeConfig::default();
        let (near, far) = UnixStream::pair().unwrap();
        let shared = Arc::new(Mutex::new(Shared::default()));
        let bridge = Bridge::new(
            SharedConnection(shared.clone()),
            BufferedStream::unix(near, &config),
            &config,
        );
        let (handle, task) = spawn(&Handle::current(), bridge, None);
        (handle, task, far, shared)
    }

    #[tokio::test]
    async fn test_driver_forwards_both_ways() {
        let (handle, _task, mut far, shared) = start();

        handle
            .post(ConnectionEvent::Read(bytes::Bytes::from_static(b"down")))
            .unwrap();
        let mut buf = [0u8; 4];
        far.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"down");

        far.write_all(b"up").await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while shared.lock().unwrap().sent != b"up" {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_dropping_handles_resets_connection() {
        let (handle, task, mut far, shared) = start();

        drop(handle);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();

        assert!(shared.lock().unwrap().closed);
        let mut rest = Vec::new();
        assert_eq!(far.read_to_end(&mut rest).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_consumer_gone_with_output_queued() {
        let (handle, task, far, shared) = start();

        let chunk = bytes::Bytes::from(vec![0x5a; 64 * 1024]);
        for _ in 0..64 {
            handle.post(ConnectionEvent::Read(chunk.clone())).unwrap();
        }
        drop(far);

        // A panic inside the task would surface here as a join error.
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();

        assert!(shared.lock().unwrap().closed);
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_post_after_finish_fails() {
        let (handle, task, _far, _shared) = start();

        handle
            .post(ConnectionEvent::Error(ConnectionError::TimedOut))
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();

        assert!(handle.is_closed());
        assert!(matches!(
            handle.post(ConnectionEvent::Writable),
            Err(BridgeError::BridgeClosed)
        ));
    }
}
