//! Benchmarks for chunksync operations.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::io::{Cursor, Write};

use chunksync::{Bitmap, ChunkDigest, DigestTable, FullTransfer};
use flate2::write::GzEncoder;
use flate2::Compression;

fn bench_chunk_digest(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_digest");

    for size in [512, 4096, 65536].iter() {
        let data = vec![42u8; *size];

        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("compute", size), &data, |b, data| {
            b.iter(|| ChunkDigest::compute(black_box(data)));
        });
    }

    group.finish();
}

fn bench_digest_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("digest_table");

    for size in [10_240, 102_400, 1_024_000].iter() {
        let data = vec![42u8; *size];

        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("compute", size), &data, |b, data| {
            b.iter(|| DigestTable::compute(&mut Cursor::new(black_box(data)), 4096));
        });
    }

    group.finish();
}

fn bench_bitmap(c: &mut Criterion) {
    let mut group = c.benchmark_group("bitmap");

    for chunks in [64usize, 4096, 262_144].iter() {
        let flags: Vec<bool> = (0..*chunks).map(|i| i % 7 == 0).collect();
        let bitmap = Bitmap::encode(&flags);

        group.bench_with_input(BenchmarkId::new("encode", chunks), &flags, |b, flags| {
            b.iter(|| Bitmap::encode(black_box(flags)));
        });
        group.bench_with_input(
            BenchmarkId::new("changed_chunks", chunks),
            &bitmap,
            |b, bitmap| {
                b.iter(|| bitmap.changed_chunks(*chunks).count());
            },
        );
    }

    group.finish();
}

fn bench_decompress(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_transfer");
    let dir = tempfile::tempdir().expect("tempdir");

    for size in [102_400usize, 1_024_000].iter() {
        let data: Vec<u8> = (0..*size).map(|i| (i % 251) as u8).collect();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&data).expect("compress");
        let compressed = encoder.finish().expect("compress");

        let transfer = FullTransfer::new(4096, dir.path().join("bench.gz"));
        let target = dir.path().join("bench.out");

        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(
            BenchmarkId::new("receive_and_decompress", size),
            &compressed,
            |b, compressed| {
                b.iter(|| {
                    transfer
                        .run(&mut Cursor::new(black_box(compressed)), &target)
                        .expect("full transfer")
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_chunk_digest,
    bench_digest_table,
    bench_bitmap,
    bench_decompress,
);
criterion_main!(benches);
