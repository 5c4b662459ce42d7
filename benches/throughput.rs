//! Throughput Benchmark for QuickKV
//!
//! Measures the single-threaded hot paths: store writes under eviction
//! pressure, reads, command dispatch from raw RESP bytes, and expiry sweeps.

use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use quickkv::commands::CommandHandler;
use quickkv::config::{Config, EvictionStrategy};
use quickkv::protocol::RespParser;
use quickkv::storage::{sweep, Entry, Evictor, Store};
use std::time::Duration;

fn evictor(keys_limit: usize, eviction_strategy: EvictionStrategy) -> Evictor {
    Evictor::from_config(&Config {
        keys_limit,
        eviction_strategy,
        ..Default::default()
    })
}

/// Benchmark writes, with and without eviction
fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("put");
    group.throughput(Throughput::Elements(1));

    group.bench_function("below_limit", |b| {
        let evictor = evictor(usize::MAX, EvictionStrategy::SimpleFirst);
        let mut store = Store::new();
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i));
            store.put(key, Entry::new(Bytes::from("small_value")), &evictor);
            i += 1;
        });
    });

    for strategy in [EvictionStrategy::SimpleFirst, EvictionStrategy::AllKeysRandom] {
        group.bench_function(format!("at_limit_{}", strategy), |b| {
            let evictor = evictor(10_000, strategy);
            let mut store = Store::with_capacity(10_000);
            let mut i = 0u64;
            b.iter(|| {
                let key = Bytes::from(format!("key:{}", i));
                store.put(key, Entry::new(Bytes::from("small_value")), &evictor);
                i += 1;
            });
            black_box(store.len());
        });
    }

    group.finish();
}

/// Benchmark GET operations
fn bench_get(c: &mut Criterion) {
    let evictor = evictor(usize::MAX, EvictionStrategy::SimpleFirst);
    let mut store = Store::new();

    // Pre-populate with data
    for i in 0..100_000 {
        let key = Bytes::from(format!("key:{}", i));
        let value = Bytes::from(format!("value:{}", i));
        store.put(key, Entry::new(value), &evictor);
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            black_box(store.get(key.as_bytes()));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("missing:{}", i);
            black_box(store.get(key.as_bytes()));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark parse + execute for a pipelined batch of commands
fn bench_dispatch(c: &mut Criterion) {
    let handler = CommandHandler::new(evictor(10_000, EvictionStrategy::SimpleFirst), "bench.aof");

    let mut batch = BytesMut::new();
    for i in 0..100 {
        let key = format!("key:{}", i);
        batch.extend_from_slice(
            format!(
                "*3\r\n$3\r\nSET\r\n${}\r\n{}\r\n$5\r\nvalue\r\n*2\r\n$3\r\nGET\r\n${}\r\n{}\r\n",
                key.len(),
                key,
                key.len(),
                key
            )
            .as_bytes(),
        );
    }
    let batch = batch.freeze();

    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(200));

    group.bench_function("set_get_pipeline", |b| {
        let mut parser = RespParser::new();
        let mut store = Store::new();
        b.iter(|| {
            let mut buf = BytesMut::from(&batch[..]);
            while let Some(command) = parser.parse_command(&mut buf).unwrap() {
                black_box(handler.execute(&mut store, &command));
            }
        });
    });

    group.finish();
}

/// Benchmark the active expiry sweep
fn bench_sweep(c: &mut Criterion) {
    let evictor = evictor(usize::MAX, EvictionStrategy::SimpleFirst);

    let mut group = c.benchmark_group("expiry");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("sweep_half_expired", |b| {
        b.iter_batched(
            || {
                let mut store = Store::with_capacity(10_000);
                for i in 0..10_000 {
                    let key = Bytes::from(format!("key:{}", i));
                    let ttl = if i % 2 == 0 {
                        Duration::ZERO
                    } else {
                        Duration::from_secs(3600)
                    };
                    store.put(key, Entry::with_ttl(Bytes::from("value"), ttl), &evictor);
                }
                store
            },
            |mut store| black_box(sweep(&mut store)),
            BatchSize::LargeInput,
        );
    });

    group.bench_function("sweep_nothing_expired", |b| {
        let mut store = Store::new();
        for i in 0..10_000 {
            let key = Bytes::from(format!("key:{}", i));
            store.put(key, Entry::with_ttl(Bytes::from("value"), Duration::from_secs(3600)), &evictor);
        }
        b.iter(|| black_box(sweep(&mut store)));
    });

    group.finish();
}

criterion_group!(benches, bench_put, bench_get, bench_dispatch, bench_sweep);

criterion_main!(benches);
