//! Event transitions and half-close coordination.
//!
//! | Event | Condition | Action |
//! |---|---|---|
//! | connection `Connected` | paired endpoint held | notify it, release it, then as `Writable` |
//! | connection `Writable` | stream present | flush |
//! | connection `Read` | stream writable | queue into stream output, else drop |
//! | connection `Eof` | | suspend reads; stop writing the stream once its output is empty |
//! | connection `Error` | | close connection, gracefully close stream |
//! | connection `Destroying` | | log statistics |
//! | stream `Readable` | | flush |
//! | stream `WriteDrained` | | acknowledge, or finish the stream if the connection is gone |
//! | stream `Error` | connection present, input empty | suspend reads, half-close connection receive side, discard output if the write side failed; stop writing if reads were already suspended and output is empty |
//! | stream `Error` | otherwise | close connection, abort stream |
//! | stream `Eof(WRITE)` | stream read disabled | close connection, abort stream |
//! | stream `Eof(WRITE)` | stream read enabled | half-close connection receive side, discard output |
//! | stream `Eof(READ)` | reads not suspended | flush (half-closes connection send side once input is empty) |
//! | stream `Eof(READ)` | reads suspended | close connection, gracefully close stream |

use std::net::Shutdown;

use tracing::{debug, trace, warn};

use super::lifecycle::log_stats;
use super::{Bridge, Status};
use crate::event::{ConnectionEvent, Direction, StreamEvent};
use crate::transport::{StreamEndpoint, UdpConnection};

impl<C: UdpConnection, S: StreamEndpoint> Bridge<C, S> {
    /// Handle one event from the connection (transport A).
    pub fn on_connection_event(&mut self, event: ConnectionEvent) -> Status {
        if self.finished {
            self.report_violation("connection event delivered to finished bridge");
            return Status::Finished;
        }
        if !matches!(event, ConnectionEvent::Writable | ConnectionEvent::Read(_)) {
            debug!(event = event.name(), "connection state change");
        }
        if self.conn.is_none() {
            trace!(event = event.name(), "connection already detached, ignoring");
            return self.maybe_destroy();
        }

        match event {
            ConnectionEvent::Connected => {
                if let Some(peer) = self.peer.take() {
                    peer.0.connected();
                }
                self.on_connection_writable()
            }
            ConnectionEvent::Writable => self.on_connection_writable(),
            ConnectionEvent::Read(data) => self.on_connection_read(&data),
            ConnectionEvent::Eof => self.on_connection_eof(),
            ConnectionEvent::Error(code) => {
                warn!(error = %code, "connection error");
                self.close_connection();
                self.graceful_close_stream()
            }
            ConnectionEvent::Destroying => {
                if let Some(stats) = self.conn.as_ref().and_then(|conn| conn.stats()) {
                    log_stats(&stats);
                }
                Status::Active
            }
        }
    }

    /// Handle one event from the stream endpoint (transport B).
    pub fn on_stream_event(&mut self, event: StreamEvent) -> Status {
        if self.finished {
            self.report_violation("stream event delivered to finished bridge");
            return Status::Finished;
        }
        if self.stream.is_none() {
            trace!(?event, "stream already closed, ignoring");
            return self.maybe_destroy();
        }

        match event {
            StreamEvent::Readable => self.flush(),
            StreamEvent::WriteDrained => self.on_write_drained(),
            StreamEvent::Connected => {
                debug!("stream connected");
                Status::Active
            }
            StreamEvent::Error(dir) => self.on_stream_error(dir),
            StreamEvent::Eof(dir) => self.on_stream_eof(dir),
        }
    }

    fn on_connection_writable(&mut self) -> Status {
        if self.stream.is_some() {
            return self.flush();
        }
        Status::Active
    }

    fn on_connection_eof(&mut self) -> Status {
        self.read_suspended = true;
        let drained = match self.stream.as_mut() {
            Some(stream) => stream.output().is_empty(),
            None => false,
        };
        if drained {
            return self.stop_writing();
        }
        Status::Active
    }

    /// Stop writing to the stream: half-close its write side, or finish
    /// both sides if the stream is no longer reading either.
    pub(super) fn stop_writing(&mut self) -> Status {
        let Some(stream) = self.stream.as_mut() else {
            return self.maybe_destroy();
        };
        if stream.enabled().contains(Direction::WRITE) {
            stream.disable(Direction::WRITE);
            stream.shutdown_write();
        }
        if stream.enabled().contains(Direction::READ) {
            return Status::Active;
        }
        self.flush()
    }

    fn on_stream_error(&mut self, dir: Direction) -> Status {
        warn!(direction = %dir, "stream error");
        if let (Some(conn), Some(stream)) = (self.conn.as_mut(), self.stream.as_mut()) {
            if stream.input().is_empty() {
                if dir.contains(Direction::WRITE) {
                    stream.disable(Direction::WRITE);
                    discard_output(stream);
                }
                let already_suspended = self.read_suspended;
                self.read_suspended = true;
                conn.shutdown(Shutdown::Read);
                // The connection's EOF has been seen: nothing will arrive to
                // finish the stream later.
                if already_suspended && stream.output().is_empty() {
                    return self.stop_writing();
                }
                return Status::Active;
            }
        }
        if self.conn.is_some() {
            self.close_connection();
        }
        self.abort_stream();
        self.maybe_destroy()
    }

    fn on_stream_eof(&mut self, dir: Direction) -> Status {
        debug!(direction = %dir, "stream end of file");

        if dir.contains(Direction::WRITE) {
            let Some(stream) = self.stream.as_mut() else {
                return self.maybe_destroy();
            };
            stream.disable(Direction::WRITE);
            if !stream.enabled().contains(Direction::READ) {
                if self.conn.is_some() {
                    self.close_connection();
                }
                self.abort_stream();
                return self.maybe_destroy();
            }
            discard_output(stream);
            if let Some(conn) = self.conn.as_mut() {
                self.read_suspended = true;
                conn.shutdown(Shutdown::Read);
            }
        }

        if dir.contains(Direction::READ) {
            if let Some(stream) = self.stream.as_mut() {
                stream.disable(Direction::READ);
            }
            if !self.read_suspended {
                return self.flush();
            }
            if self.conn.is_some() {
                self.close_connection();
            }
            return self.graceful_close_stream();
        }

        Status::Active
    }
}

fn discard_output<S: StreamEndpoint>(stream: &mut S) {
    let output = stream.output();
    if !output.is_empty() {
        trace!(bytes = output.len(), "discarding undeliverable stream output");
        output.clear();
    }
}
