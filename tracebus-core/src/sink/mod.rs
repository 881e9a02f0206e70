//! Trace sinks
//!
//! A [`TraceSink`] binds its own endpoint, decodes each datagram into a
//! batch, drops what its interest filter rejects and hands the rest to
//! every registered callback on the receive thread.
//!
//! ```text
//! UdpReceiver ──► decode_batch ──► filter ──► SinkRegistry ──► callbacks
//!      │              │
//!      │              └─ malformed: whole datagram dropped, counted
//!      └─ timeout: check for stop
//! ```

mod registry;

pub use registry::{CallbackId, DispatchReport, SinkCallback, SinkRegistry};

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tracebus_protocol::{decode_batch, TraceEvent};

use crate::config::SinkSettings;
use crate::error::{Result, TraceBusError};
use crate::rules::RuleSet;
use crate::stats::{SinkCounters, SinkStats};
use crate::transport::{DatagramHandler, ReceiveLoop, TransportState, UdpReceiver};

/// A received event with its origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracePacket {
    pub event: TraceEvent,
    /// Address of the producer that sent the datagram
    pub source: SocketAddr,
    pub received_at: DateTime<Utc>,
}

/// State shared with the receive thread
#[derive(Debug)]
struct SinkShared {
    registry: SinkRegistry,
    filter: RuleSet,
    counters: SinkCounters,
}

impl SinkShared {
    fn accepts(&self, event: &TraceEvent) -> bool {
        self.filter.is_empty() || self.filter.is_enabled(&event.subsystem, event.detail_level)
    }
}

impl DatagramHandler for SinkShared {
    fn on_datagram(&self, datagram: &[u8], source: SocketAddr) {
        SinkCounters::add(&self.counters.datagrams_received, 1);

        let events = match decode_batch(datagram) {
            Ok(events) => events,
            Err(e) => {
                SinkCounters::add(&self.counters.decode_failures, 1);
                debug!(%source, error = %e, "dropping malformed datagram");
                return;
            }
        };

        let received_at = Utc::now();
        let total = events.len();
        let packets: Vec<TracePacket> = events
            .into_iter()
            .filter(|event| self.accepts(event))
            .map(|event| TracePacket {
                event,
                source,
                received_at,
            })
            .collect();

        SinkCounters::add(&self.counters.packets_filtered, (total - packets.len()) as u64);
        if packets.is_empty() {
            return;
        }

        let report = self.registry.dispatch(&packets);
        if report.invoked() > 0 {
            SinkCounters::add(&self.counters.packets_delivered, packets.len() as u64);
        }
        SinkCounters::add(&self.counters.callback_failures, report.panicked as u64);
    }

    fn on_receive_error(&self, error: &TraceBusError) {
        SinkCounters::add(&self.counters.receive_failures, 1);
        warn!(error = %error, "trace receive failed");
    }
}

/// Independent listener on the trace bus
///
/// A sink does not depend on any producer in the process; several sinks
/// may listen on the same multicast or broadcast endpoint.
pub struct TraceSink {
    settings: SinkSettings,
    shared: Arc<SinkShared>,
    receive_loop: Mutex<Option<ReceiveLoop>>,
}

impl TraceSink {
    /// Create a stopped sink; the interest filter is validated here
    pub fn new(settings: SinkSettings) -> Result<Self> {
        let filter = RuleSet::with_rules(settings.filter_rules()?);
        Ok(Self {
            settings,
            shared: Arc::new(SinkShared {
                registry: SinkRegistry::new(),
                filter,
                counters: SinkCounters::default(),
            }),
            receive_loop: Mutex::new(None),
        })
    }

    /// Register `callback` and start receiving if not already running
    ///
    /// If binding fails the callback is removed again and the error returned.
    pub fn start<F>(&self, callback: F) -> Result<CallbackId>
    where
        F: Fn(&[TracePacket]) + Send + Sync + 'static,
    {
        let mut receive_loop = self.receive_loop.lock();
        let id = self.shared.registry.register(callback);
        if receive_loop.is_some() {
            return Ok(id);
        }

        match self.spawn_loop() {
            Ok(spawned) => {
                info!(local = %spawned.local_addr(), "trace sink started");
                *receive_loop = Some(spawned);
                Ok(id)
            }
            Err(e) => {
                self.shared.registry.unregister(id);
                Err(e)
            }
        }
    }

    fn spawn_loop(&self) -> Result<ReceiveLoop> {
        let endpoint = self.settings.endpoint()?;
        let adapter = self.settings.adapter_addr()?;
        let receiver = UdpReceiver::bind(&endpoint, adapter, self.settings.receive_timeout())?;
        ReceiveLoop::spawn(receiver, Arc::clone(&self.shared))
    }

    /// Stop receiving and drop every callback
    ///
    /// Returns once the receive thread has exited, at most one receive
    /// timeout later. From inside a callback it returns immediately.
    pub fn stop(&self) {
        let Some(receive_loop) = self.receive_loop.lock().take() else {
            return;
        };
        receive_loop.stop();
        self.shared.registry.clear();
        info!(local = %receive_loop.local_addr(), "trace sink stopped");
    }

    /// Add a callback to a running or stopped sink
    pub fn register<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&[TracePacket]) + Send + Sync + 'static,
    {
        self.shared.registry.register(callback)
    }

    pub fn unregister(&self, id: CallbackId) -> bool {
        self.shared.registry.unregister(id)
    }

    pub fn is_running(&self) -> bool {
        self.receive_loop.lock().is_some()
    }

    /// Bound address while running; useful when listening on port 0
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.receive_loop.lock().as_ref().map(ReceiveLoop::local_addr)
    }

    /// Transport state; `Unbound` while stopped
    pub fn state(&self) -> TransportState {
        self.receive_loop
            .lock()
            .as_ref()
            .map_or(TransportState::Unbound, |l| l.receiver().state())
    }

    pub fn stats(&self) -> SinkStats {
        self.shared.counters.snapshot()
    }

    pub fn settings(&self) -> &SinkSettings {
        &self.settings
    }
}

impl Drop for TraceSink {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracebus_protocol::{encode, encode_batch};

    fn shared(filter: &[&str]) -> SinkShared {
        SinkShared {
            registry: SinkRegistry::new(),
            filter: RuleSet::parse(filter).unwrap(),
            counters: SinkCounters::default(),
        }
    }

    fn source() -> SocketAddr {
        "10.1.2.3:5555".parse().unwrap()
    }

    fn collect(shared: &SinkShared) -> Arc<Mutex<Vec<Vec<TracePacket>>>> {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&batches);
        shared
            .registry
            .register(move |packets| sink.lock().push(packets.to_vec()));
        batches
    }

    #[test]
    fn test_datagram_becomes_tagged_batch() {
        let shared = shared(&[]);
        let batches = collect(&shared);

        let events = vec![
            TraceEvent::new("disk", 1, "a", "", ""),
            TraceEvent::new("net", 2, "b", "", ""),
        ];
        shared.on_datagram(&encode_batch(&events).unwrap(), source());

        let batches = batches.lock();
        assert_eq!(batches.len(), 1);
        let got: Vec<_> = batches[0].iter().map(|p| p.event.clone()).collect();
        assert_eq!(got, events);
        assert!(batches[0].iter().all(|p| p.source == source()));
        assert_eq!(shared.counters.snapshot().packets_delivered, 2);
    }

    #[test]
    fn test_filter_drops_uninteresting_packets() {
        let shared = shared(&["5:disk"]);
        let batches = collect(&shared);

        let events = vec![
            TraceEvent::new("disk", 5, "a", "", ""),
            TraceEvent::new("disk", 6, "b", "", ""),
            TraceEvent::new("net", 0, "c", "", ""),
        ];
        shared.on_datagram(&encode_batch(&events).unwrap(), source());

        let batches = batches.lock();
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[0][0].event.event_name, "a");

        let stats = shared.counters.snapshot();
        assert_eq!(stats.packets_filtered, 2);
        assert_eq!(stats.packets_delivered, 1);
    }

    #[test]
    fn test_fully_filtered_datagram_is_not_dispatched() {
        let shared = shared(&["1:disk"]);
        let batches = collect(&shared);
        shared.on_datagram(
            &encode(&TraceEvent::new("net", 0, "c", "", "")).unwrap(),
            source(),
        );
        assert!(batches.lock().is_empty());
    }

    #[test]
    fn test_malformed_datagram_is_counted_and_dropped() {
        let shared = shared(&[]);
        let batches = collect(&shared);

        let mut datagram = encode(&TraceEvent::new("disk", 1, "a", "", "")).unwrap();
        datagram.extend_from_slice(&[0x54, 0x42, 1]);
        shared.on_datagram(&datagram, source());
        shared.on_datagram(b"garbage", source());

        assert!(batches.lock().is_empty());
        let stats = shared.counters.snapshot();
        assert_eq!(stats.datagrams_received, 2);
        assert_eq!(stats.decode_failures, 2);
    }

    #[test]
    fn test_callback_panics_are_counted() {
        let shared = shared(&[]);
        shared.registry.register(|_| panic!("callback failure"));
        let batches = collect(&shared);

        shared.on_datagram(
            &encode(&TraceEvent::new("disk", 1, "a", "", "")).unwrap(),
            source(),
        );

        assert_eq!(batches.lock().len(), 1);
        assert_eq!(shared.counters.snapshot().callback_failures, 1);
    }

    #[test]
    fn test_invalid_filter_is_rejected_at_construction() {
        let settings = SinkSettings::new("127.0.0.1:0").with_filter("nope");
        assert!(matches!(
            TraceSink::new(settings),
            Err(TraceBusError::InvalidRule { .. })
        ));
    }

    #[test]
    fn test_stopped_sink_state() {
        let sink = TraceSink::new(SinkSettings::new("127.0.0.1:0")).unwrap();
        assert_eq!(sink.state(), TransportState::Unbound);
        assert!(sink.local_addr().is_none());
        sink.stop();
    }

    #[test]
    fn test_start_twice_shares_one_socket() {
        let sink = TraceSink::new(SinkSettings::new("127.0.0.1:0")).unwrap();
        sink.start(|_| {}).unwrap();
        let addr = sink.local_addr();
        sink.start(|_| {}).unwrap();

        assert_eq!(sink.local_addr(), addr);
        assert_eq!(sink.shared.registry.len(), 2);

        sink.stop();
        assert!(!sink.is_running());
        assert!(sink.shared.registry.is_empty());
    }

    #[test]
    fn test_bind_failure_unregisters_callback() {
        let sink = TraceSink::new(SinkSettings::new("not-an-endpoint")).unwrap();
        assert!(sink.start(|_| {}).is_err());
        assert!(sink.shared.registry.is_empty());
    }
}
