//! Benchmarks for the probe building blocks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sighup_latency_rs::{handler, SighupProbe};

fn benchmark_direct_raise(c: &mut Criterion) {
    let mut probe = SighupProbe::new().expect("failed to set up probe");
    c.bench_function("direct_raise_attempt", |b| {
        b.iter(|| {
            let outcome = probe.direct_raise();
            let _ = black_box(outcome);
        });
    });
}

fn benchmark_time_now(c: &mut Criterion) {
    c.bench_function("monotonic_time_read", |b| {
        b.iter(|| {
            let now = handler::time_now();
            let _ = black_box(now);
        });
    });
}

criterion_group!(benches, benchmark_direct_raise, benchmark_time_now);
criterion_main!(benches);
