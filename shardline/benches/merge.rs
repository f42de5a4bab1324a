//! Benchmarks for the merge and encode paths.
//!
//! Run with: `cargo bench -p shardline -- merge`

#![allow(missing_docs, clippy::cast_possible_truncation)]

use chrono::{Duration, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use shardline::{Codec, CsvCodec, Reading, Storage, StorageConfig, merge, merge_map};
use tempfile::tempdir;

/// One hour of one-second samples for `source`, starting `offset` seconds in.
fn hour(source: &str, offset: i64, value: f64) -> Vec<Reading> {
    let base = Utc.with_ymd_and_hms(2016, 8, 2, 4, 0, 0).unwrap();
    (0..3600)
        .map(|i| Reading::new(source, base + Duration::seconds(offset + i), value + i as f64))
        .collect()
}

fn bench_merge_overlap(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge/overlap");

    for overlap in [0i64, 1800, 3600] {
        let stored = hour("NZ_APIM_50_LFZ", 0, 0.0);
        let incoming = hour("NZ_APIM_50_LFZ", 3600 - overlap, 0.5);

        group.bench_with_input(BenchmarkId::new("binary_search", overlap), &overlap, |b, _| {
            b.iter(|| merge(black_box(&stored), black_box(&incoming)));
        });
        group.bench_with_input(BenchmarkId::new("ordered_map", overlap), &overlap, |b, _| {
            b.iter(|| merge_map(black_box(&stored), black_box(&incoming)));
        });
    }

    group.finish();
}

fn bench_encode_hour(c: &mut Criterion) {
    let codec = CsvCodec::default();
    let readings = hour("NZ_APIM_50_LFZ", 0, -41221.0);
    let encoded = codec.encode(&readings).unwrap();

    c.bench_function("codec/encode_hour", |b| {
        b.iter(|| codec.encode(black_box(&readings)).unwrap());
    });
    c.bench_function("codec/decode_hour", |b| {
        b.iter(|| codec.decode(black_box(&encoded)).unwrap());
    });
}

fn bench_store_unchanged(c: &mut Criterion) {
    let temp_dir = tempdir().unwrap();
    let storage = Storage::from_config(&StorageConfig::default()).unwrap();
    let readings = hour("NZ_APIM_50_LFZ", 0, 0.0);
    storage.store(temp_dir.path(), readings.clone()).unwrap();

    c.bench_function("store/unchanged_hour", |b| {
        b.iter(|| {
            storage
                .store(temp_dir.path(), black_box(readings.clone()))
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_merge_overlap, bench_encode_hour, bench_store_unchanged);
criterion_main!(benches);
