//! Trace producer
//!
//! A [`Tracer`] gates every write on its enable rules, encodes the event
//! and hands the packet to a transport. When nothing is enabled, or the
//! tracer is stopped, `write` returns before touching the event text.
//!
//! ```text
//! write() ──► RuleSet ──► encode ──┬──────────────────► transport.send
//!               │                  └──► Coalescer ──┘
//!               └─ disabled: return
//! ```

mod coalescer;

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use tracebus_protocol::{encode_bounded, EventRef, TraceEvent};

use crate::config::{BatchConfig, TraceSettings};
use crate::error::Result;
use crate::rules::{EnableRule, RuleSet, SubsystemPattern};
use crate::stats::{EmitterCounters, EmitterStats};
use crate::transport::{PacketTransport, UdpSender};
use coalescer::Coalescer;

static GLOBAL_TRACER: OnceLock<Tracer> = OnceLock::new();

/// Resources that exist only while the tracer is started
struct ActiveTrace {
    transport: Arc<dyn PacketTransport>,
    coalescer: Option<Coalescer>,
}

impl ActiveTrace {
    fn submit(&self, packet: Vec<u8>, counters: &EmitterCounters) {
        match &self.coalescer {
            Some(coalescer) => coalescer.submit(packet),
            None => send_datagram(self.transport.as_ref(), &packet, 1, counters),
        }
    }

    fn shutdown(&self) {
        if let Some(coalescer) = &self.coalescer {
            coalescer.shutdown();
        }
        self.transport.close();
    }
}

/// Process trace producer
///
/// Owned instances are independent; [`Tracer::global`] is the shared one.
pub struct Tracer {
    rules: RuleSet,
    active: ArcSwapOption<ActiveTrace>,
    lifecycle: Mutex<()>,
    counters: Arc<EmitterCounters>,
}

impl Tracer {
    pub fn new() -> Self {
        Self {
            rules: RuleSet::new(),
            active: ArcSwapOption::empty(),
            lifecycle: Mutex::new(()),
            counters: Arc::new(EmitterCounters::default()),
        }
    }

    /// The process-wide tracer, created on first use
    pub fn global() -> &'static Tracer {
        GLOBAL_TRACER.get_or_init(Tracer::new)
    }

    /// Bind a UDP sender and load the configured rules
    ///
    /// Configured rules are added to any enabled at runtime. Calling
    /// `start` on a started tracer does nothing.
    pub fn start(&self, settings: &TraceSettings) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();
        if self.active.load().is_some() {
            debug!("tracer already started");
            return Ok(());
        }

        settings.validate()?;
        let endpoint = settings.endpoint()?;
        let rules = settings.rules()?;
        let sender = UdpSender::bind(&endpoint, settings.adapter_addr()?, settings.max_datagram_size)?;

        info!(
            endpoint = %endpoint,
            local = ?sender.local_addr(),
            rules = rules.len(),
            "tracer started"
        );
        self.activate(Arc::new(sender), &rules, settings.batch.as_ref())
    }

    /// Start on a caller-supplied transport
    pub fn start_with_transport(
        &self,
        transport: Arc<dyn PacketTransport>,
        rules: Vec<EnableRule>,
        batch: Option<BatchConfig>,
    ) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();
        if self.active.load().is_some() {
            debug!("tracer already started");
            return Ok(());
        }
        if let Some(config) = &batch {
            config.validate()?;
        }
        self.activate(transport, &rules, batch.as_ref())
    }

    fn activate(
        &self,
        transport: Arc<dyn PacketTransport>,
        rules: &[EnableRule],
        batch: Option<&BatchConfig>,
    ) -> Result<()> {
        let coalescer = batch
            .map(|config| Coalescer::spawn(Arc::clone(&transport), config, Arc::clone(&self.counters)))
            .transpose()?;

        self.rules.extend(rules);
        self.active
            .store(Some(Arc::new(ActiveTrace { transport, coalescer })));
        Ok(())
    }

    /// Close the transport and clear every rule
    ///
    /// Writes racing with `stop` either complete or are dropped. Calling
    /// `stop` on a stopped tracer does nothing.
    pub fn stop(&self) {
        let _lifecycle = self.lifecycle.lock();
        let Some(active) = self.active.swap(None) else {
            return;
        };

        self.rules.clear();
        active.shutdown();
        info!("tracer stopped");
    }

    pub fn is_started(&self) -> bool {
        self.active.load().is_some()
    }

    /// Emit events for `subsystem` up to `max_detail_level`
    ///
    /// `subsystem` may be `*` or a glob pattern.
    pub fn enable(&self, subsystem: &str, max_detail_level: u8) -> Result<()> {
        let pattern = SubsystemPattern::parse(subsystem)?;
        self.rules.enable(EnableRule::new(max_detail_level, pattern));
        Ok(())
    }

    /// Remove every rule for `subsystem`, returning how many were removed
    pub fn disable(&self, subsystem: &str) -> usize {
        self.rules.disable(subsystem)
    }

    /// Whether a write at this level would be sent
    #[inline]
    pub fn is_enabled(&self, subsystem: &str, detail_level: u8) -> bool {
        self.is_started() && self.rules.is_enabled(subsystem, detail_level)
    }

    /// Emit one event
    ///
    /// Returns an encode error when a field or the whole packet is too large;
    /// send failures are counted in [`stats`](Self::stats), not returned.
    pub fn write(
        &self,
        subsystem: &str,
        detail_level: u8,
        event_name: &str,
        summary: &str,
        details: &str,
    ) -> Result<()> {
        self.write_ref(EventRef::new(subsystem, detail_level, event_name, summary, details))
    }

    /// Emit an owned event
    pub fn write_event(&self, event: &TraceEvent) -> Result<()> {
        self.write_ref(event.into())
    }

    fn write_ref(&self, event: EventRef<'_>) -> Result<()> {
        if !self.rules.is_enabled(event.subsystem, event.detail_level) {
            return Ok(());
        }
        let active = self.active.load();
        let Some(active) = active.as_ref() else {
            return Ok(());
        };

        let packet = encode_bounded(event, active.transport.max_datagram_size())
            .inspect_err(|_| self.counters.record_encode_failure())?;
        active.submit(packet, &self.counters);
        Ok(())
    }

    pub fn stats(&self) -> EmitterStats {
        self.counters.snapshot()
    }

    /// Local address of the bound transport, while started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.active
            .load()
            .as_ref()
            .and_then(|active| active.transport.local_addr())
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Tracer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Send one datagram holding `packets` packets, counting the outcome
pub(crate) fn send_datagram(
    transport: &dyn PacketTransport,
    datagram: &[u8],
    packets: u64,
    counters: &EmitterCounters,
) {
    match transport.send(datagram) {
        Ok(sent) => counters.record_datagram(packets, sent),
        Err(e) => {
            if counters.record_send_failure(packets) == 0 {
                warn!(error = %e, "trace send failed, dropping packets");
            } else {
                debug!(error = %e, "trace send failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TraceBusError;
    use crate::transport::{MemoryTransport, TransportState};
    use tracebus_protocol::{decode, EncodeError, MAX_SUBSYSTEM_LEN};

    fn started(rules: &[&str]) -> (Tracer, MemoryTransport) {
        let transport = MemoryTransport::new();
        let tracer = Tracer::new();
        let rules: Vec<EnableRule> = rules.iter().map(|r| r.parse().unwrap()).collect();
        tracer
            .start_with_transport(Arc::new(transport.clone()), rules, None)
            .unwrap();
        (tracer, transport)
    }

    #[test]
    fn test_write_is_noop_until_started() {
        let tracer = Tracer::new();
        tracer.enable("disk", 10).unwrap();
        tracer.write("disk", 1, "read", "", "").unwrap();
        assert!(!tracer.is_enabled("disk", 1));
        assert_eq!(tracer.stats(), EmitterStats::default());
    }

    #[test]
    fn test_enabled_write_sends_one_packet() {
        let (tracer, transport) = started(&[]);
        tracer.enable("disk", 10).unwrap();
        tracer.write("disk", 10, "read", "block 7", "lba=7").unwrap();

        let datagrams = transport.datagrams();
        assert_eq!(datagrams.len(), 1);
        let event = decode(&datagrams[0]).unwrap();
        assert_eq!(event, TraceEvent::new("disk", 10, "read", "block 7", "lba=7"));
        assert_eq!(tracer.stats().packets_sent, 1);
    }

    #[test]
    fn test_level_above_max_is_not_sent() {
        let (tracer, transport) = started(&[]);
        tracer.enable("disk", 5).unwrap();
        tracer.write("disk", 10, "read", "", "").unwrap();
        tracer.write("net", 0, "read", "", "").unwrap();
        assert_eq!(transport.send_attempts(), 0);
    }

    #[test]
    fn test_configured_rules_are_additive_with_runtime_rules() {
        let (tracer, transport) = started(&["3:net"]);
        tracer.enable("disk", 1).unwrap();

        tracer.write("net", 3, "rx", "", "").unwrap();
        tracer.write("disk", 1, "read", "", "").unwrap();
        assert_eq!(transport.datagrams().len(), 2);
    }

    #[test]
    fn test_disable_removes_only_that_subsystem() {
        let (tracer, transport) = started(&[]);
        tracer.enable("disk", 5).unwrap();
        tracer.enable("net", 5).unwrap();
        assert_eq!(tracer.disable("disk"), 1);

        tracer.write("disk", 1, "read", "", "").unwrap();
        tracer.write("net", 1, "rx", "", "").unwrap();
        let sent = transport.datagrams();
        assert_eq!(sent.len(), 1);
        assert_eq!(decode(&sent[0]).unwrap().subsystem, "net");
    }

    #[test]
    fn test_oversize_field_is_an_encode_error() {
        let (tracer, transport) = started(&["255:*"]);
        let long = "s".repeat(MAX_SUBSYSTEM_LEN + 1);
        let err = tracer.write(&long, 0, "e", "", "").unwrap_err();

        assert!(matches!(
            err,
            TraceBusError::Encode(EncodeError::FieldTooLong { .. })
        ));
        assert!(transport.datagrams().is_empty());
        assert_eq!(tracer.stats().encode_failures, 1);
    }

    #[test]
    fn test_packet_larger_than_transport_limit() {
        let transport = MemoryTransport::with_max_datagram_size(64);
        let tracer = Tracer::new();
        tracer
            .start_with_transport(Arc::new(transport.clone()), vec!["1:*".parse().unwrap()], None)
            .unwrap();

        let err = tracer.write("disk", 1, "e", &"x".repeat(100), "").unwrap_err();
        assert!(matches!(
            err,
            TraceBusError::Encode(EncodeError::PacketTooLarge { max: 64, .. })
        ));
        assert_eq!(transport.send_attempts(), 0);
    }

    #[test]
    fn test_send_failures_are_counted_not_returned() {
        let (tracer, transport) = started(&["1:*"]);
        transport.fail_sends(true);

        tracer.write("disk", 1, "read", "", "").unwrap();
        tracer.write("disk", 1, "read", "", "").unwrap();

        let stats = tracer.stats();
        assert_eq!(stats.send_failures, 2);
        assert_eq!(stats.packets_sent, 0);
    }

    #[test]
    fn test_stop_clears_rules_and_closes_transport() {
        let (tracer, transport) = started(&["1:*"]);
        tracer.stop();

        assert!(!tracer.is_started());
        assert!(tracer.rules().is_empty());
        assert_eq!(transport.state(), TransportState::Closed);

        tracer.write("disk", 1, "read", "", "").unwrap();
        assert_eq!(transport.send_attempts(), 0);

        // Idempotent
        tracer.stop();
    }

    #[test]
    fn test_start_is_idempotent() {
        let (tracer, first) = started(&[]);
        let second = MemoryTransport::new();
        tracer
            .start_with_transport(Arc::new(second.clone()), vec![], None)
            .unwrap();

        tracer.enable("disk", 1).unwrap();
        tracer.write("disk", 1, "read", "", "").unwrap();
        assert_eq!(first.datagrams().len(), 1);
        assert!(second.datagrams().is_empty());
    }

    #[test]
    fn test_restart_after_stop() {
        let (tracer, _) = started(&["1:*"]);
        tracer.stop();

        let transport = MemoryTransport::new();
        tracer
            .start_with_transport(Arc::new(transport.clone()), vec![], None)
            .unwrap();
        // Rules were cleared by stop
        tracer.write("disk", 1, "read", "", "").unwrap();
        assert!(transport.datagrams().is_empty());

        tracer.enable("disk", 1).unwrap();
        tracer.write("disk", 1, "read", "", "").unwrap();
        assert_eq!(transport.datagrams().len(), 1);
    }

    #[test]
    fn test_coalesced_writes_flush_on_stop() {
        let transport = MemoryTransport::new();
        let tracer = Tracer::new();
        let batch = BatchConfig::default().flush_interval(std::time::Duration::from_secs(5));
        tracer
            .start_with_transport(Arc::new(transport.clone()), vec!["9:*".parse().unwrap()], Some(batch))
            .unwrap();

        for i in 0..3 {
            tracer.write("disk", 1, "io", &i.to_string(), "").unwrap();
        }
        tracer.stop();

        let datagrams = transport.datagrams();
        assert_eq!(datagrams.len(), 1);
        assert_eq!(tracebus_protocol::decode_batch(&datagrams[0]).unwrap().len(), 3);
        assert_eq!(tracer.stats().datagrams_sent, 1);
        assert_eq!(tracer.stats().packets_sent, 3);
    }

    #[test]
    fn test_start_with_transport_rejects_zero_flush_interval() {
        let tracer = Tracer::new();
        let batch = BatchConfig {
            flush_interval_ms: 0,
            ..BatchConfig::default()
        };
        let err = tracer
            .start_with_transport(Arc::new(MemoryTransport::new()), Vec::new(), Some(batch))
            .unwrap_err();
        assert!(matches!(err, TraceBusError::InvalidSetting { .. }));
        assert!(!tracer.is_started());
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let tracer = Tracer::new();
        assert!(matches!(
            tracer.enable("disk[", 1),
            Err(TraceBusError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_global_is_shared() {
        assert!(std::ptr::eq(Tracer::global(), Tracer::global()));
    }
}
