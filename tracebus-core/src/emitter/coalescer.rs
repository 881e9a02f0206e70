//! Burst coalescing
//!
//! ```text
//! write() ──try_send──► bounded channel ──► flush thread ──► transport
//!    │                       │                   │
//!    │                       └─ full: drop       └─ flush on size, interval, shutdown
//!    └─ never blocks
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::send_datagram;
use crate::config::BatchConfig;
use crate::error::Result;
use crate::stats::EmitterCounters;
use crate::transport::PacketTransport;

/// Floor for the flush wait, so an idle flush thread always sleeps
const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

enum Command {
    Packet(Vec<u8>),
    Shutdown,
}

/// Queue plus flush thread packing packets into shared datagrams
pub(crate) struct Coalescer {
    sender: Sender<Command>,
    flush_thread: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<EmitterCounters>,
}

impl Coalescer {
    pub(crate) fn spawn(
        transport: Arc<dyn PacketTransport>,
        config: &BatchConfig,
        counters: Arc<EmitterCounters>,
    ) -> Result<Self> {
        let (sender, receiver) = channel::bounded(config.queue_capacity.max(1));
        let interval = flush_wait(config);
        let thread_counters = Arc::clone(&counters);

        let handle = thread::Builder::new()
            .name("tracebus-flush".to_string())
            .spawn(move || flush_loop(receiver, transport.as_ref(), interval, &thread_counters))?;

        Ok(Self {
            sender,
            flush_thread: Mutex::new(Some(handle)),
            counters,
        })
    }

    /// Queue an encoded packet without blocking
    pub(crate) fn submit(&self, packet: Vec<u8>) {
        match self.sender.try_send(Command::Packet(packet)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                if self.counters.record_queue_drop() == 0 {
                    warn!("trace queue full, dropping packets");
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                self.counters.record_send_failure(1);
            }
        }
    }

    /// Flush what is queued and wait for the flush thread to exit
    pub(crate) fn shutdown(&self) {
        let Some(handle) = self.flush_thread.lock().take() else {
            return;
        };
        // Blocks only while the flush thread drains a full queue
        let _ = self.sender.send(Command::Shutdown);
        if handle.join().is_err() {
            warn!("trace flush thread panicked");
        }
    }
}

impl Drop for Coalescer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn flush_wait(config: &BatchConfig) -> Duration {
    config.flush_interval_duration().max(MIN_FLUSH_INTERVAL)
}

fn flush_loop(
    receiver: Receiver<Command>,
    transport: &dyn PacketTransport,
    interval: Duration,
    counters: &EmitterCounters,
) {
    let max = transport.max_datagram_size();
    let mut pending = Pending::with_capacity(max);

    loop {
        let wait = pending
            .deadline
            .map_or(interval, |d| d.saturating_duration_since(Instant::now()));

        match receiver.recv_timeout(wait) {
            Ok(Command::Packet(packet)) => {
                if !pending.fits(&packet, max) {
                    pending.flush(transport, counters);
                }
                pending.push(&packet, interval);
                if pending.is_due() {
                    pending.flush(transport, counters);
                }
            }
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                // Packets queued behind the shutdown request are still sent
                while let Ok(Command::Packet(packet)) = receiver.try_recv() {
                    if !pending.fits(&packet, max) {
                        pending.flush(transport, counters);
                    }
                    pending.push(&packet, interval);
                }
                pending.flush(transport, counters);
                break;
            }
            Err(RecvTimeoutError::Timeout) => pending.flush(transport, counters),
        }
    }

    debug!("trace flush thread stopped");
}

/// Datagram under construction
struct Pending {
    buf: Vec<u8>,
    packets: u64,
    deadline: Option<Instant>,
}

impl Pending {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            packets: 0,
            deadline: None,
        }
    }

    fn fits(&self, packet: &[u8], max: usize) -> bool {
        self.buf.len() + packet.len() <= max
    }

    fn push(&mut self, packet: &[u8], interval: Duration) {
        if self.packets == 0 {
            self.deadline = Some(Instant::now() + interval);
        }
        self.buf.extend_from_slice(packet);
        self.packets += 1;
    }

    fn is_due(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn flush(&mut self, transport: &dyn PacketTransport, counters: &EmitterCounters) {
        if self.packets > 0 {
            send_datagram(transport, &self.buf, self.packets, counters);
        }
        self.buf.clear();
        self.packets = 0;
        self.deadline = None;
    }
}
