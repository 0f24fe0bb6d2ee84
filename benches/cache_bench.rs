//! Benchmarks for the quantized cache container.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempfile::TempDir;

use kv_cache_store::cache::codec::quantize;
use kv_cache_store::cache::entry::{CacheEntry, Tensor};
use kv_cache_store::container::coalesce::coalesce;
use kv_cache_store::container::reader::CacheReader;
use kv_cache_store::container::writer::CacheWriter;

fn bench_quantize(c: &mut Criterion) {
    // One 32x128 KV tensor (a typical per-layer slice).
    let values: Vec<f32> = (0..32 * 128).map(|i| ((i as f32) * 0.37).sin() * 0.5).collect();
    let tensor = Tensor::from_f32(vec![32, 128], &values).unwrap();

    c.bench_function("quantize_32x128", |b| {
        b.iter(|| {
            let q = quantize(black_box(&tensor), None).unwrap();
            black_box(q);
        })
    });
}

fn bench_coalesce(c: &mut Criterion) {
    // 10,000 indices: mostly contiguous stretches with scattered singletons.
    let indices: Vec<usize> = (0..10_000)
        .map(|i| if i % 17 == 0 { i * 3 } else { i })
        .collect();

    c.bench_function("coalesce_10k_indices", |b| {
        b.iter(|| {
            let runs = coalesce(black_box(&indices));
            black_box(runs);
        })
    });
}

fn bench_load_naive_vs_optimized(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    let writer = CacheWriter::new(tmp.path()).unwrap();
    let reader = CacheReader::new(tmp.path());

    let entries: Vec<CacheEntry> = (0..256)
        .map(|i| {
            let data: Vec<f32> = (0..64).map(|j| ((i * 31 + j) as f32 * 0.11).sin()).collect();
            CacheEntry::new(
                Tensor::from_f32(vec![8, 8], &data).unwrap(),
                Tensor::from_f32(vec![8, 8], &data).unwrap(),
            )
        })
        .collect();
    writer.save("bench.safetensors", &entries).unwrap();

    // Two contiguous halves requested out of order: coalesces to two reads.
    let indices: Vec<usize> = (128..256).chain(0..128).collect();

    c.bench_function("load_naive_256", |b| {
        b.iter(|| {
            let loaded = reader.load("bench.safetensors", black_box(&indices)).unwrap();
            black_box(loaded);
        })
    });

    c.bench_function("load_optimized_256", |b| {
        b.iter(|| {
            let loaded = reader
                .load_optimized("bench.safetensors", black_box(&indices))
                .unwrap();
            black_box(loaded);
        })
    });
}

criterion_group!(
    benches,
    bench_quantize,
    bench_coalesce,
    bench_load_naive_vs_optimized,
);
criterion_main!(benches);
