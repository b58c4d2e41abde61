//! Dispatch benchmarks
//!
//! Benchmarks for the delivery pipeline:
//! - Enqueue cost (lock + priority classification)
//! - Flush by batch size (snapshot + JSON body + transport)
//! - Offline buffer append near capacity
//!
//! Toyota Way: Measure before optimizing (Genchi Genbutsu)

use std::sync::Arc;

use abtrack::config::DispatcherConfig;
use abtrack::kv::MemoryKvStore;
use abtrack::telemetry::{BatchDispatcher, Event, FlushMode, OfflineBuffer};
use abtrack::transport::RecordingTransport;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn create_events(count: usize) -> Vec<Event> {
    (0..count)
        .map(|i| {
            Event::new("page_view")
                .section(format!("section_{}", i % 10))
                .payload(serde_json::json!({"scrollDepth": i % 100}))
        })
        .collect()
}

fn create_dispatcher() -> Arc<BatchDispatcher<Arc<RecordingTransport>, MemoryKvStore>> {
    let config = DispatcherConfig::default().with_batch_size(usize::MAX);
    Arc::new(BatchDispatcher::new(
        config,
        "bench-session",
        Arc::new(RecordingTransport::new()),
        MemoryKvStore::new(),
    ))
}

/// Benchmark enqueue of normal-priority events (no flush triggered)
fn bench_enqueue(c: &mut Criterion) {
    let dispatcher = create_dispatcher();
    let event = create_events(1).remove(0);

    c.bench_function("enqueue", |b| {
        b.iter(|| black_box(dispatcher.enqueue(event.clone())));
    });
}

/// Benchmark flush by batch size
fn bench_flush(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("flush");

    for size in [10, 100, 1_000].iter() {
        let events = create_events(*size);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.to_async(&runtime).iter(|| {
                let dispatcher = create_dispatcher();
                for event in &events {
                    dispatcher.enqueue(event.clone());
                }
                async move { black_box(dispatcher.flush(FlushMode::Async).await) }
            });
        });
    }

    group.finish();
}

/// Benchmark offline append when the buffer is already full
fn bench_offline_append(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let buffer = OfflineBuffer::new(MemoryKvStore::new(), 1_000);
    runtime.block_on(buffer.append(&create_events(1_000))).unwrap();
    let batch = create_events(10);

    c.bench_function("offline_append_full", |b| {
        b.to_async(&runtime)
            .iter(|| async { black_box(buffer.append(&batch).await.unwrap()) });
    });
}

criterion_group!(benches, bench_enqueue, bench_flush, bench_offline_append);
criterion_main!(benches);
