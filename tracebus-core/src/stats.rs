//! Self-diagnosis counters for producers and sinks

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live producer counters
#[derive(Debug, Default)]
pub(crate) struct EmitterCounters {
    pub(crate) packets_sent: AtomicU64,
    pub(crate) datagrams_sent: AtomicU64,
    pub(crate) bytes_sent: AtomicU64,
    pub(crate) send_failures: AtomicU64,
    pub(crate) encode_failures: AtomicU64,
    pub(crate) queue_drops: AtomicU64,
}

impl EmitterCounters {
    pub(crate) fn record_datagram(&self, packets: u64, bytes: usize) {
        self.packets_sent.fetch_add(packets, Ordering::Relaxed);
        self.datagrams_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Returns the failure count before this one
    pub(crate) fn record_send_failure(&self, packets: u64) -> u64 {
        self.send_failures.fetch_add(packets, Ordering::Relaxed)
    }

    pub(crate) fn record_encode_failure(&self) {
        self.encode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the drop count before this one
    pub(crate) fn record_queue_drop(&self) -> u64 {
        self.queue_drops.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn snapshot(&self) -> EmitterStats {
        EmitterStats {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            datagrams_sent: self.datagrams_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            queue_drops: self.queue_drops.load(Ordering::Relaxed),
        }
    }
}

/// Producer statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmitterStats {
    /// Packets handed to the transport
    pub packets_sent: u64,
    /// Datagrams sent; lower than `packets_sent` when coalescing
    pub datagrams_sent: u64,
    pub bytes_sent: u64,
    /// Packets lost to send errors
    pub send_failures: u64,
    /// Writes rejected because an event did not fit the wire format
    pub encode_failures: u64,
    /// Packets dropped because the coalescing queue was full
    pub queue_drops: u64,
}

/// Live sink counters
#[derive(Debug, Default)]
pub(crate) struct SinkCounters {
    pub(crate) datagrams_received: AtomicU64,
    pub(crate) packets_delivered: AtomicU64,
    pub(crate) packets_filtered: AtomicU64,
    pub(crate) decode_failures: AtomicU64,
    pub(crate) receive_failures: AtomicU64,
    pub(crate) callback_failures: AtomicU64,
}

impl SinkCounters {
    pub(crate) fn snapshot(&self) -> SinkStats {
        SinkStats {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            packets_delivered: self.packets_delivered.load(Ordering::Relaxed),
            packets_filtered: self.packets_filtered.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            receive_failures: self.receive_failures.load(Ordering::Relaxed),
            callback_failures: self.callback_failures.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

/// Sink statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SinkStats {
    pub datagrams_received: u64,
    /// Packets passed to callbacks, counted once per batch entry
    pub packets_delivered: u64,
    /// Packets rejected by the sink filter
    pub packets_filtered: u64,
    /// Datagrams dropped as malformed
    pub decode_failures: u64,
    pub receive_failures: u64,
    /// Callback invocations that panicked
    pub callback_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emitter_snapshot() {
        let counters = EmitterCounters::default();
        counters.record_datagram(3, 120);
        counters.record_datagram(1, 40);
        assert_eq!(counters.record_send_failure(2), 0);
        assert_eq!(counters.record_send_failure(1), 2);
        counters.record_encode_failure();
        assert_eq!(counters.record_queue_drop(), 0);

        let stats = counters.snapshot();
        assert_eq!(stats.packets_sent, 4);
        assert_eq!(stats.datagrams_sent, 2);
        assert_eq!(stats.bytes_sent, 160);
        assert_eq!(stats.send_failures, 3);
        assert_eq!(stats.encode_failures, 1);
        assert_eq!(stats.queue_drops, 1);
    }

    #[test]
    fn test_sink_stats_serialize() {
        let counters = SinkCounters::default();
        SinkCounters::add(&counters.packets_delivered, 2);

        let json = serde_json::to_value(counters.snapshot()).unwrap();
        assert_eq!(json["packets_delivered"], 2);
        assert_eq!(json["decode_failures"], 0);
    }
}
