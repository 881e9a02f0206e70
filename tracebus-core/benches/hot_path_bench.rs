//! Benchmarks for the producer hot path
//!
//! Compares the disabled no-op write against enabled writes, direct and
//! coalesced, on an in-memory transport.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use tracebus_core::protocol::{decode_batch, encode, encode_batch};
use tracebus_core::{BatchConfig, EnableRule, MemoryTransport, RuleSet, TraceEvent, Tracer};

fn rules(texts: &[&str]) -> Vec<EnableRule> {
    texts.iter().map(|t| t.parse().unwrap()).collect()
}

fn sample_event() -> TraceEvent {
    TraceEvent::new(
        "disk",
        4,
        "write",
        "flushed journal block",
        "lba=123456 len=4096 queue_depth=3",
    )
}

fn bench_is_enabled(c: &mut Criterion) {
    let mut group = c.benchmark_group("rule_lookup");

    let exact = RuleSet::with_rules(rules(&["10:disk", "3:net", "1:gpu"]));
    group.bench_function(BenchmarkId::new("exact", "3_rules"), |b| {
        b.iter(|| black_box(exact.is_enabled(black_box("gpu"), black_box(1))))
    });

    let glob = RuleSet::with_rules(rules(&["10:disk*", "3:net.?x", "1:gpu[0-9]"]));
    group.bench_function(BenchmarkId::new("glob", "3_rules"), |b| {
        b.iter(|| black_box(glob.is_enabled(black_box("gpu7"), black_box(1))))
    });

    let empty = RuleSet::new();
    group.bench_function(BenchmarkId::new("empty", "0_rules"), |b| {
        b.iter(|| black_box(empty.is_enabled(black_box("disk"), black_box(1))))
    });

    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let event = sample_event();
    c.bench_function("encode", |b| b.iter(|| black_box(encode(black_box(&event)).unwrap())));

    let batch: Vec<TraceEvent> = (0..32).map(|_| sample_event()).collect();
    let datagram = encode_batch(&batch).unwrap();
    c.bench_function("decode_batch_32", |b| {
        b.iter(|| black_box(decode_batch(black_box(&datagram)).unwrap()))
    });
}

fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("write");

    group.bench_function(BenchmarkId::new("disabled", "noop"), |b| {
        let tracer = Tracer::new();
        tracer
            .start_with_transport(Arc::new(MemoryTransport::discarding()), rules(&["10:net"]), None)
            .unwrap();
        b.iter(|| tracer.write("disk", 4, "write", "flushed", "").unwrap())
    });

    group.bench_function(BenchmarkId::new("enabled", "direct"), |b| {
        let tracer = Tracer::new();
        let transport = MemoryTransport::discarding();
        tracer
            .start_with_transport(Arc::new(transport), rules(&["10:disk"]), None)
            .unwrap();
        b.iter(|| tracer.write("disk", 4, "write", "flushed", "").unwrap())
    });

    group.bench_function(BenchmarkId::new("enabled", "coalesced"), |b| {
        let tracer = Tracer::new();
        tracer
            .start_with_transport(
                Arc::new(MemoryTransport::discarding()),
                rules(&["10:disk"]),
                Some(BatchConfig::default()),
            )
            .unwrap();
        b.iter(|| tracer.write("disk", 4, "write", "flushed", "").unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_is_enabled, bench_codec, bench_write);
criterion_main!(benches);
