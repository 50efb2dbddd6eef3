//! Ownership and teardown of the two sides.

use tracing::{debug, trace};

use super::{Bridge, Status};
use crate::event::{ConnectionStats, Direction};
use crate::transport::{StreamEndpoint, UdpConnection};

impl<C: UdpConnection, S: StreamEndpoint> Bridge<C, S> {
    /// Detach and close the connection, releasing the paired endpoint.
    pub(super) fn close_connection(&mut self) {
        match self.conn.take() {
            Some(conn) => {
                if let Some(stats) = conn.stats() {
                    log_stats(&stats);
                }
                conn.close();
                debug!("connection closed");
            }
            None => self.report_violation("connection closed twice"),
        }
        self.peer = None;
    }

    /// Release the stream endpoint.
    ///
    /// Both directions must already be disabled and both buffers empty.
    /// Anything else means data would be lost silently.
    pub(super) fn close_stream(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            self.report_violation("stream closed twice");
            return;
        };

        let enabled = stream.enabled();
        let input = stream.input().len();
        let output = stream.output().len();
        if !enabled.is_empty() || input != 0 || output != 0 {
            self.report_violation("stream closed with live directions or buffered data");
            debug!(%enabled, input, output, "forcing stream teardown");
            stream.disable(Direction::BOTH);
            stream.input().clear();
            stream.output().clear();
        }

        stream.close();
        debug!("stream closed");
    }

    /// Report whether both sides are gone. Call after clearing either handle.
    pub(super) fn maybe_destroy(&mut self) -> Status {
        if self.conn.is_some() || self.stream.is_some() {
            return Status::Active;
        }
        if !self.finished {
            self.finished = true;
            debug!(stats = ?self.stats, "bridge finished");
        }
        Status::Finished
    }

    /// Wind the stream down without losing queued output.
    ///
    /// Unconsumed input is discarded (nothing can forward it any more) and
    /// reading stops. The write side closes now if the output buffer is
    /// empty, otherwise once it drains.
    pub(super) fn graceful_close_stream(&mut self) -> Status {
        if let Some(stream) = self.stream.as_mut() {
            let input = stream.input();
            if !input.is_empty() {
                trace!(bytes = input.len(), "discarding unforwarded stream input");
                input.clear();
            }
            stream.disable(Direction::READ);
            if stream.output().is_empty() {
                stream.disable(Direction::WRITE);
                self.close_stream();
            }
        }
        self.maybe_destroy()
    }

    /// Error-driven teardown: queued data in both directions is discarded.
    pub(super) fn abort_stream(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            let input = stream.input().len();
            let output = stream.output().len();
            if input != 0 || output != 0 {
                debug!(input, output, "discarding buffered stream data");
            }
            stream.input().clear();
            stream.output().clear();
            stream.disable(Direction::BOTH);
            self.close_stream();
        }
    }
}

pub(super) fn log_stats(stats: &ConnectionStats) {
    debug!(
        bytes_sent = stats.bytes_sent,
        bytes_received = stats.bytes_received,
        packets_received = stats.packets_received,
        packets_sent = stats.packets_sent,
        duplicate_receives = stats.duplicate_receives,
        retransmits = stats.retransmits,
        fast_retransmits = stats.fast_retransmits,
        mtu_guess = stats.mtu_guess,
        "connection statistics"
    );
}
