//! Addressing Benchmarks
//!
//! Cost of turning user keys into digests and partitions, and of the
//! single-record path through the in-process cluster:
//! - digest computation per key type and size
//! - partition routing
//! - put/get round trips and batch reads
//!
//! ## Running
//!
//! ```bash
//! cargo bench --bench addressing
//! cargo bench --bench addressing -- "digest"
//! ```

use aeroclient::aeroclient_core::{compute_digest, partition_id_for};
use aeroclient::{Client, Key, Value};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Fixed seed so every run hashes the same keys
const BENCH_SEED: u64 = 0x5EED_0F_D16E57;

const KEY_SIZES: &[usize] = &[8, 64, 512, 4096];

fn digest_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("digest");

    group.bench_function("int_key", |b| {
        let mut i = 0i64;
        b.iter(|| {
            i = i.wrapping_add(1);
            black_box(compute_digest("test", "demo", &Value::Int(i)).unwrap())
        })
    });

    let mut rng = StdRng::seed_from_u64(BENCH_SEED);
    for size in KEY_SIZES {
        let text: String = (0..*size).map(|_| rng.gen_range('a'..='z')).collect();
        let key = Value::String(text);
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("string_key", size), &key, |b, key| {
            b.iter(|| black_box(compute_digest("test", "demo", key).unwrap()))
        });

        let bytes: Vec<u8> = (0..*size).map(|_| rng.gen()).collect();
        let key = Value::Blob(bytes);
        group.bench_with_input(BenchmarkId::new("bytes_key", size), &key, |b, key| {
            b.iter(|| black_box(compute_digest("test", "demo", key).unwrap()))
        });
    }
    group.finish();
}

fn partition_benchmarks(c: &mut Criterion) {
    let digests: Vec<_> = (0..1024i64)
        .map(|i| compute_digest("test", "demo", &Value::Int(i)).unwrap())
        .collect();
    c.bench_function("partition/route_1024", |b| {
        b.iter(|| {
            let mut hits = [0u32; 16];
            for d in &digests {
                hits[(partition_id_for(d) % 16) as usize] += 1;
            }
            black_box(hits)
        })
    });
}

fn record_path_benchmarks(c: &mut Criterion) {
    let client = Client::in_memory();
    let keys: Vec<Key> = (0..1000i64)
        .map(|i| Key::new("test", "demo", i).unwrap())
        .collect();
    for (i, k) in keys.iter().enumerate() {
        client
            .put(k, &[("v", Value::Int(i as i64))], None, None)
            .unwrap();
    }

    let mut group = c.benchmark_group("record");
    group.bench_function("put", |b| {
        let mut i = 0usize;
        b.iter(|| {
            i = (i + 1) % keys.len();
            client
                .put(&keys[i], &[("v", Value::Int(i as i64))], None, None)
                .unwrap()
        })
    });
    group.bench_function("get", |b| {
        let mut i = 0usize;
        b.iter(|| {
            i = (i + 1) % keys.len();
            black_box(client.get(&keys[i], None).unwrap())
        })
    });
    for n in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("get_many", n), &n, |b, n| {
            b.iter(|| black_box(client.get_many(&keys[..*n], None).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    digest_benchmarks,
    partition_benchmarks,
    record_path_benchmarks
);
criterion_main!(benches);
