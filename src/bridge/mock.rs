//! In-memory collaborators for bridge tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::net::Shutdown;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::BytesMut;

use crate::event::{ConnectionStats, Direction};
use crate::transport::{ConnectNotify, StreamEndpoint, UdpConnection};

/// Scripted result for one send call.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SendResult {
    Accept(usize),
    Backpressure,
    Fail,
}

#[derive(Debug)]
pub(crate) struct ConnLog {
    /// Requested length of every send call.
    pub sends: Vec<usize>,
    /// Concatenation of all accepted bytes.
    pub sent: Vec<u8>,
    pub script: VecDeque<SendResult>,
    /// Per-call acceptance limit once the script is exhausted.
    pub cap: usize,
    pub shutdowns: Vec<Shutdown>,
    pub read_drained: usize,
    pub closed: bool,
}

impl Default for ConnLog {
    fn default() -> Self {
        Self {
            sends: Vec::new(),
            sent: Vec::new(),
            script: VecDeque::new(),
            cap: usize::MAX,
            shutdowns: Vec::new(),
            read_drained: 0,
            closed: false,
        }
    }
}

pub(crate) struct MockConnection {
    log: Rc<RefCell<ConnLog>>,
}

pub(crate) fn connection() -> (MockConnection, Rc<RefCell<ConnLog>>) {
    let log = Rc::new(RefCell::new(ConnLog::default()));
    (MockConnection { log: log.clone() }, log)
}

impl UdpConnection for MockConnection {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut log = self.log.borrow_mut();
        assert!(!log.closed, "send on closed connection");
        log.sends.push(buf.len());
        let accepted = match log.script.pop_front() {
            Some(SendResult::Accept(n)) => n.min(buf.len()),
            Some(SendResult::Backpressure) => 0,
            Some(SendResult::Fail) => return Err(io::Error::new(io::ErrorKind::Other, "send failed")),
            None => log.cap.min(buf.len()),
        };
        log.sent.extend_from_slice(&buf[..accepted]);
        Ok(accepted)
    }

    fn shutdown(&mut self, how: Shutdown) {
        self.log.borrow_mut().shutdowns.push(how);
    }

    fn read_drained(&mut self) {
        self.log.borrow_mut().read_drained += 1;
    }

    fn close(self) {
        let mut log = self.log.borrow_mut();
        assert!(!log.closed, "connection closed twice");
        log.closed = true;
    }

    fn stats(&self) -> Option<ConnectionStats> {
        Some(ConnectionStats {
            bytes_sent: self.log.borrow().sent.len() as u64,
            mtu_guess: 1500,
            ..Default::default()
        })
    }
}

#[derive(Debug, Default)]
pub(crate) struct StreamLog {
    pub shutdown_write: usize,
    pub closed: bool,
    /// Enabled directions and buffer lengths at close.
    pub closed_with: Option<(Direction, usize, usize)>,
}

pub(crate) struct MockStream {
    pub enabled: Direction,
    pub input: BytesMut,
    pub output: BytesMut,
    log: Rc<RefCell<StreamLog>>,
}

pub(crate) fn stream() -> (MockStream, Rc<RefCell<StreamLog>>) {
    let log = Rc::new(RefCell::new(StreamLog::default()));
    let stream = MockStream {
        enabled: Direction::NONE,
        input: BytesMut::new(),
        output: BytesMut::new(),
        log: log.clone(),
    };
    (stream, log)
}

impl StreamEndpoint for MockStream {
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
        self.log.borrow_mut().shutdown_write += 1;
    }

    fn close(self) {
        let mut log = self.log.borrow_mut();
        log.closed = true;
        log.closed_with = Some((self.enabled, self.input.len(), self.output.len()));
    }
}

impl StreamLog {
    /// Closed with nothing enabled and both buffers empty.
    pub fn closed_clean(&self) -> bool {
        self.closed_with == Some((Direction::NONE, 0, 0))
    }
}

#[derive(Debug, Default)]
pub(crate) struct CountingNotify {
    connected: AtomicUsize,
    detached: AtomicUsize,
}

impl CountingNotify {
    pub fn connected_count(&self) -> usize {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn detached_count(&self) -> usize {
        self.detached.load(Ordering::SeqCst)
    }
}

impl ConnectNotify for CountingNotify {
    fn connected(&self) {
        self.connected.fetch_add(1, Ordering::SeqCst);
    }

    fn detached(&self) {
        self.detached.fetch_add(1, Ordering::SeqCst);
    }
}
