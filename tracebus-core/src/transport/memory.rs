//! In-memory transport for testing

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::state::{StateCell, TransportState};
use super::PacketTransport;

/// Transport that records datagrams instead of sending them
///
/// Clones share the same record, so a test can keep one handle while the
/// emitter owns another.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    datagrams: Mutex<Vec<Vec<u8>>>,
    send_attempts: AtomicU64,
    fail_sends: AtomicBool,
    keep: bool,
    max_datagram_size: usize,
    state: StateCell,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::with_max_datagram_size(tracebus_protocol::MAX_DATAGRAM_SIZE)
    }

    pub fn with_max_datagram_size(max_datagram_size: usize) -> Self {
        Self::build(max_datagram_size, true)
    }

    /// Count sends without keeping the datagrams, for long-running benchmarks
    pub fn discarding() -> Self {
        Self::build(tracebus_protocol::MAX_DATAGRAM_SIZE, false)
    }

    fn build(max_datagram_size: usize, keep: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                datagrams: Mutex::new(Vec::new()),
                send_attempts: AtomicU64::new(0),
                fail_sends: AtomicBool::new(false),
                keep,
                max_datagram_size,
                state: StateCell::new(TransportState::Bound),
            }),
        }
    }

    /// Make every following send fail, as an unreachable network would
    pub fn fail_sends(&self, fail: bool) {
        self.inner.fail_sends.store(fail, Ordering::Release);
    }

    /// Datagrams recorded so far
    pub fn datagrams(&self) -> Vec<Vec<u8>> {
        self.inner.datagrams.lock().clone()
    }

    /// Number of times `send` was called, successful or not
    pub fn send_attempts(&self) -> u64 {
        self.inner.send_attempts.load(Ordering::Acquire)
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketTransport for MemoryTransport {
    fn send(&self, datagram: &[u8]) -> io::Result<usize> {
        self.inner.send_attempts.fetch_add(1, Ordering::AcqRel);

        if self.inner.state.is_closed() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "trace transport is closed",
            ));
        }
        if self.inner.fail_sends.load(Ordering::Acquire) {
            return Err(io::Error::new(
                io::ErrorKind::NetworkUnreachable,
                "network unreachable",
            ));
        }

        if self.inner.keep {
            self.inner.datagrams.lock().push(datagram.to_vec());
        }
        Ok(datagram.len())
    }

    fn close(&self) {
        self.inner.state.close();
    }

    fn max_datagram_size(&self) -> usize {
        self.inner.max_datagram_size
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }

    fn state(&self) -> TransportState {
        self.inner.state.get()
    }
}
