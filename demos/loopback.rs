//! Loopback demo - two bridges joined back to back.
//!
//! Instead of a real UDP protocol, each bridge's connection hands what it
//! sends straight to the other bridge as received data. A client writes a
//! line on one paired stream and an upper-casing server answers on the
//! other.
//!
//! ```text
//! RUST_LOG=utp_bridge=debug cargo run --example loopback
//! ```

use std::io;
use std::net::Shutdown;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::runtime::Handle;
use tracing_subscriber::EnvFilter;
use utp_bridge::{
    create_stream_bridge, BridgeConfig, BridgeHandle, ConnectionEvent, LinkState, UdpConnection,
};

/// One end of an in-memory connection.
struct Wire {
    peer: Arc<OnceLock<BridgeHandle>>,
    fin_sent: bool,
}

impl Wire {
    fn post(&self, event: ConnectionEvent) {
        if let Some(peer) = self.peer.get() {
            // The other side may already be gone.
            let _ = peer.post(event);
        }
    }

    fn finish(&mut self) {
        if !self.fin_sent {
            self.fin_sent = true;
            self.post(ConnectionEvent::Eof);
        }
    }
}

impl UdpConnection for Wire {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.post(ConnectionEvent::Read(Bytes::copy_from_slice(buf)));
        Ok(buf.len())
    }

    fn shutdown(&mut self, how: Shutdown) {
        if matches!(how, Shutdown::Write | Shutdown::Both) {
            self.finish();
        }
    }

    fn read_drained(&mut self) {}

    fn close(mut self) {
        self.finish();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = BridgeConfig::default();
    let to_server = Arc::new(OnceLock::new());
    let to_client = Arc::new(OnceLock::new());

    let client_wire = Wire {
        peer: to_server.clone(),
        fin_sent: false,
    };
    let server_wire = Wire {
        peer: to_client.clone(),
        fin_sent: false,
    };

    let (mut client, client_handle) = create_stream_bridge(&Handle::current(), client_wire, &config)?;
    let (mut server, server_handle) = create_stream_bridge(&Handle::current(), server_wire, &config)?;
    let _ = to_client.set(client_handle.clone());
    let _ = to_server.set(server_handle.clone());

    client_handle.post(ConnectionEvent::Connected)?;
    server_handle.post(ConnectionEvent::Connected)?;
    assert_eq!(client.connected().await, LinkState::Connected);
    assert_eq!(server.connected().await, LinkState::Connected);

    let server_task = tokio::spawn(async move {
        let mut request = Vec::new();
        server.read_to_end(&mut request).await?;
        println!("server got: {}", String::from_utf8_lossy(&request).trim_end());
        server.write_all(&request.to_ascii_uppercase()).await?;
        server.shutdown().await?;
        Ok::<_, io::Error>(())
    });

    client.write_all(b"hello over the bridge\n").await?;
    client.shutdown().await?;

    let mut reply = Vec::new();
    client.read_to_end(&mut reply).await?;
    println!("client got: {}", String::from_utf8_lossy(&reply).trim_end());

    server_task.await??;
    drop((client_handle, server_handle));
    Ok(())
}
