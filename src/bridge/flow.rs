//! Data movement between the two sides.

use std::net::Shutdown;

use bytes::Buf;
use tracing::{trace, warn};

use super::{Bridge, Status};
use crate::event::Direction;
use crate::transport::{StreamEndpoint, UdpConnection};

impl<C: UdpConnection, S: StreamEndpoint> Bridge<C, S> {
    /// Move pending stream input into the connection.
    ///
    /// Input is submitted in chunks of at most `max_chunk` bytes. A chunk
    /// the connection refuses stays in the input buffer for the next
    /// writable notification. Once the stream will never produce more input
    /// and everything has been submitted, the connection's send side is
    /// half-closed, or both sides are closed if the stream is done writing
    /// too. Output the stream can no longer write is dropped then.
    pub(super) fn flush(&mut self) -> Status {
        let Some(stream) = self.stream.as_mut() else {
            return self.maybe_destroy();
        };
        let Some(conn) = self.conn.as_mut() else {
            return self.graceful_close_stream();
        };

        loop {
            let input = stream.input();
            if input.is_empty() {
                break;
            }
            let len = input.len().min(self.max_chunk);
            match conn.send(&input[..len]) {
                Err(err) => {
                    warn!(error = %err, "connection send failed");
                    self.close_connection();
                    return self.graceful_close_stream();
                }
                Ok(0) => {
                    trace!(pending = input.len(), "connection applying backpressure");
                    break;
                }
                Ok(accepted) => {
                    let accepted = accepted.min(len);
                    input.advance(accepted);
                    self.stats.bytes_to_connection += accepted as u64;
                }
            }
        }

        let enabled = stream.enabled();
        if enabled.contains(Direction::READ) || !stream.input().is_empty() {
            return Status::Active;
        }
        if !enabled.contains(Direction::WRITE) {
            let unwritable = !stream.output().is_empty();
            self.close_connection();
            if unwritable {
                self.abort_stream();
            } else {
                self.close_stream();
            }
            return self.maybe_destroy();
        }
        conn.shutdown(Shutdown::Write);
        Status::Active
    }

    /// Forward data received on the connection into the stream's output.
    pub(super) fn on_connection_read(&mut self, data: &[u8]) -> Status {
        match self.stream.as_mut() {
            Some(stream) if stream.enabled().contains(Direction::WRITE) => {
                stream.write(data);
                self.stats.bytes_to_stream += data.len() as u64;
            }
            _ => {
                trace!(bytes = data.len(), "stream not writable, dropping connection data");
                self.stats.bytes_dropped += data.len() as u64;
            }
        }
        Status::Active
    }

    /// The stream's output buffer has been fully written.
    pub(super) fn on_write_drained(&mut self) -> Status {
        let Some(stream) = self.stream.as_mut() else {
            return self.maybe_destroy();
        };
        if !stream.output().is_empty() {
            return Status::Active;
        }
        let Some(conn) = self.conn.as_mut() else {
            return self.graceful_close_stream();
        };

        conn.read_drained();
        if self.read_suspended && stream.enabled().contains(Direction::WRITE) {
            return self.stop_writing();
        }
        Status::Active
    }
}
