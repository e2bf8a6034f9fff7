//! Criterion benchmarks for rust_log_tap

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rust_log_tap::core::serializer::{format_message, serialize_args};
use rust_log_tap::prelude::*;
use rust_log_tap::{EntrySerializer, Handler};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Serializer Benchmarks
// ============================================================================

fn sample_args() -> Vec<Arg> {
    vec![
        Arg::from("request completed"),
        Arg::from(200),
        Arg::structured(serde_json::json!({"path": "/api/users", "ms": 12.5})),
        Arg::from(ErrorArg::new("TimeoutError", "upstream timed out")),
    ]
}

fn bench_serializer(c: &mut Criterion) {
    let mut group = c.benchmark_group("serializer");
    group.throughput(Throughput::Elements(1));

    let args = sample_args();
    let serializer = EntrySerializer::new(Some(&serde_json::json!({"service": "bench"})));

    group.bench_function("format_message", |b| {
        b.iter(|| black_box(format_message(black_box(&args))));
    });

    group.bench_function("serialize_args", |b| {
        b.iter(|| black_box(serialize_args(black_box(&args))));
    });

    group.bench_function("record", |b| {
        b.iter(|| black_box(serializer.serialize(LogLevel::Info, black_box(&args))));
    });

    group.finish();
}

// ============================================================================
// Capture Benchmarks
// ============================================================================

fn bench_capture(c: &mut Criterion) {
    let mut group = c.benchmark_group("capture");
    group.throughput(Throughput::Elements(1));

    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let console = Arc::new(Console::with_handlers(
        LogLevel::ALL.map(|_| Arc::new(|_: &[Arg]| {}) as Handler),
    ));
    let config = TapConfig::new("bench", "logs", "console")
        .with_enabled(true)
        .with_batch_size(500)
        .with_flush_interval(Duration::from_millis(100));
    let tap = LogTap::with_console(config, Arc::clone(&console), |_| {
        MemorySink::with_existing_table()
    })
    .expect("tap");

    {
        let _guard = runtime.enter();
        tap.start().expect("start");
    }

    let args = sample_args();
    group.bench_function("intercepted_call", |b| {
        b.iter(|| console.info(black_box(&args)));
    });

    group.finish();
    runtime.block_on(tap.stop());
}

criterion_group!(benches, bench_serializer, bench_capture);
criterion_main!(benches);
