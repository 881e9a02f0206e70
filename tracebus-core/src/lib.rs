//! # tracebus - diagnostic trace fan-out
//!
//! tracebus lets code anywhere in a process emit small structured trace
//! events, tagged with a subsystem and a detail level, and broadcasts them
//! as UDP datagrams. Any number of independent sinks, in the same process
//! or elsewhere on the LAN, listen on the same endpoint, filter what they
//! care about and hand batches to callbacks.
//!
//! - **Rules** decide what is emitted: `10:disk` enables subsystem `disk`
//!   up to detail level 10, `2:*` enables everything up to level 2.
//! - **Tracer** is the producer. With nothing enabled a write is a cheap
//!   no-op.
//! - **TraceSink** is the consumer, running its own receive thread.
//!
//! Delivery is best effort: datagrams can be lost and there is no ordering
//! between producers.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use tracebus_core::{SinkSettings, TraceSettings, TraceSink, Tracer};
//!
//! let sink = TraceSink::new(SinkSettings::new("127.0.0.1:0")).unwrap();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let collected = Arc::clone(&seen);
//! sink.start(move |batch| {
//!     collected.lock().unwrap().extend(batch.iter().map(|p| p.event.clone()));
//! })
//! .unwrap();
//!
//! let target = sink.local_addr().unwrap().to_string();
//! let tracer = Tracer::new();
//! tracer
//!     .start(&TraceSettings::new(target).with_adapter("127.0.0.1").with_rule("10:disk"))
//!     .unwrap();
//!
//! tracer.write("disk", 3, "read", "block 42", "").unwrap();
//! tracer.write("net", 0, "rx", "not enabled", "").unwrap();
//!
//! tracer.stop();
//! sink.stop();
//! ```

pub mod config;
pub mod emitter;
pub mod error;
pub mod rules;
pub mod sink;
pub mod stats;
pub mod transport;

// Re-export main types
pub use config::{BatchConfig, SinkSettings, TraceSettings, DEFAULT_TARGET};
pub use emitter::Tracer;
pub use error::{ErrorCategory, Result, TraceBusError};
pub use rules::{parse_rules, EnableRule, RuleSet, SubsystemPattern};
pub use sink::{CallbackId, SinkRegistry, TracePacket, TraceSink};
pub use stats::{EmitterStats, SinkStats};
pub use transport::{
    EndpointKind, MemoryTransport, PacketTransport, TraceEndpoint, TransportState,
};

pub use tracebus_protocol::{
    self as protocol, DecodeError, EncodeError, TraceEvent, FORMAT_VERSION, MAX_DATAGRAM_SIZE,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    #[test]
    fn test_full_workflow() {
        let sink = TraceSink::new(SinkSettings::new("127.0.0.1:0").with_filter("255:*")).unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let collected = Arc::clone(&received);
        sink.start(move |batch| collected.lock().unwrap().extend_from_slice(batch))
            .unwrap();

        let settings = TraceSettings::new(sink.local_addr().unwrap().to_string())
            .with_adapter("127.0.0.1")
            .with_rule("4:disk");
        let tracer = Tracer::new();
        tracer.start(&settings).unwrap();

        tracer.write("disk", 4, "flush", "journal", "bytes=4096").unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while received.lock().unwrap().is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }

        let packets = received.lock().unwrap().clone();
        assert_eq!(packets.len(), 1);
        assert_eq!(
            packets[0].event,
            TraceEvent::new("disk", 4, "flush", "journal", "bytes=4096")
        );
        assert_eq!(Some(packets[0].source), tracer.local_addr());

        tracer.stop();
        sink.stop();
    }

    #[test]
    fn test_protocol_reexport() {
        assert_eq!(protocol::PACKET_MAGIC, 0x5442);
        assert_eq!(FORMAT_VERSION, 1);
    }
}
