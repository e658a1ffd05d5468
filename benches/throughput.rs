//! Throughput Benchmark for lazykv
//!
//! Measures the codec and the store under a few workloads.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use lazykv::commands::CommandExecutor;
use lazykv::protocol::{decode, RespValue};
use lazykv::storage::Store;
use std::sync::Arc;
use std::time::Duration;

/// Benchmark decoding and encoding
fn bench_codec(c: &mut Criterion) {
    let set_command = b"*5\r\n$3\r\nSET\r\n$8\r\nuser:101\r\n$5\r\nalice\r\n$2\r\nPX\r\n$4\r\n1000\r\n";
    let large_bulk = RespValue::bulk_string(Bytes::from("x".repeat(64 * 1024))).encode();
    let reply = RespValue::array(vec![
        RespValue::bulk_string(Bytes::from("value")),
        RespValue::integer(42),
        RespValue::null(),
    ]);

    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Elements(1));

    group.bench_function("decode_set_command", |b| {
        b.iter(|| black_box(decode(black_box(set_command)).unwrap()));
    });

    group.bench_function("decode_large_bulk", |b| {
        b.iter(|| black_box(decode(black_box(&large_bulk)).unwrap()));
    });

    group.bench_function("encode_reply", |b| {
        b.iter(|| black_box(reply.encode()));
    });

    group.finish();
}

/// Benchmark SET operations
fn bench_set(c: &mut Criterion) {
    let store = Arc::new(Store::new());

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            store.set(Bytes::from(format!("key:{}", i)), Bytes::from("small_value"));
            i += 1;
        });
    });

    group.bench_function("set_with_expiry", |b| {
        let mut i = 0u64;
        b.iter(|| {
            store.set_with_expiry(
                Bytes::from(format!("ttl:{}", i)),
                Bytes::from("value"),
                Duration::from_secs(3600),
            );
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark GET operations
fn bench_get(c: &mut Criterion) {
    let store = Arc::new(Store::new());

    for i in 0..100_000 {
        store.set(
            Bytes::from(format!("key:{}", i)),
            Bytes::from(format!("value:{}", i)),
        );
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

/// Benchmark the full decode/execute/encode path
fn bench_handle(c: &mut Criterion) {
    let executor = CommandExecutor::new(Arc::new(Store::new()));
    executor
        .handle(b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n")
        .unwrap();

    let mut group = c.benchmark_group("handle");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get", |b| {
        b.iter(|| black_box(executor.handle(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n").unwrap()));
    });

    group.bench_function("ping", |b| {
        b.iter(|| black_box(executor.handle(b"*1\r\n$4\r\nPING\r\n").unwrap()));
    });

    group.finish();
}

/// Benchmark contention on the single store lock
fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let store = Arc::new(Store::new());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let store = Arc::clone(&store);
                    thread::spawn(move || {
                        for i in 0..10_000 {
                            let key = Bytes::from(format!("key:{}:{}", t, i));
                            store.set(key.clone(), Bytes::from("value"));
                            store.get(&key);
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(store.len());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_codec,
    bench_set,
    bench_get,
    bench_handle,
    bench_concurrent,
);

criterion_main!(benches);
