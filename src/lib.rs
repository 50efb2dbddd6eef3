//! # utp-bridge
//!
//! Splices a reliable, ordered, UDP-carried connection onto an ordinary
//! duplex byte stream, so code that only knows sockets can talk over it.
//!
//! ## Architecture
//!
//! - **Bridge core** ([`Bridge`]): sans-IO state machine that owns both
//!   sides, moves bytes between them and coordinates half-close and
//!   teardown. Driven entirely by [`ConnectionEvent`]s and [`StreamEvent`]s.
//! - **Driver**: one tokio task per bridge, fed by the UDP protocol layer
//!   through a [`BridgeHandle`] and by socket readiness.
//! - **Factories**: [`create_fd_bridge`], [`create_stream_bridge`] and
//!   [`connect_outbound`] build a bridge on a loopback pair or an outbound
//!   TCP connection.
//!
//! ## Example
//!
//! ```ignore
//! use utp_bridge::{create_stream_bridge, BridgeConfig, ConnectionEvent, LinkState};
//!
//! let (stream, handle) = create_stream_bridge(&runtime, conn, &BridgeConfig::default())?;
//!
//! // From the UDP protocol's callbacks:
//! handle.post(ConnectionEvent::Connected)?;
//! handle.post(ConnectionEvent::Read(payload))?;
//!
//! // From the consumer:
//! assert_eq!(stream.connected().await, LinkState::Connected);
//! ```

pub mod bridge;
pub mod config;
pub mod driver;
pub mod error;
pub mod event;
pub mod factory;
pub mod transport;

pub use bridge::{Bridge, BridgeStats, Phase, Status};
pub use config::BridgeConfig;
pub use driver::BridgeHandle;
pub use error::{BridgeError, Result};
pub use event::{ConnectionError, ConnectionEvent, ConnectionStats, Direction, StreamEvent};
pub use factory::connect_outbound;
#[cfg(unix)]
pub use factory::{create_fd_bridge, create_stream_bridge};
pub use transport::{BufferedStream, ConnectNotify, StreamEndpoint, UdpConnection};
#[cfg(unix)]
pub use transport::{LinkState, PairedStream, PeerLink};
