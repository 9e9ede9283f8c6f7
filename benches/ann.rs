//! Insert and search benchmarks over random vectors.
//!
//! Usage: cargo bench --bench ann

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use hnswlite::{IndexOptions, MetricKind, ScalarKind, VectorIndex};

fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dim).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect())
        .collect()
}

fn build_index(vectors: &[Vec<f32>], dim: usize, quantization: ScalarKind) -> VectorIndex {
    let index = VectorIndex::create(
        dim as u32,
        IndexOptions {
            metric: MetricKind::Cos,
            quantization,
            ..IndexOptions::default()
        },
    )
    .unwrap();
    for (i, v) in vectors.iter().enumerate() {
        index.add(i as i64, v).unwrap();
    }
    index
}

fn bench_insert(c: &mut Criterion) {
    let dim = 128;
    let mut group = c.benchmark_group("insert");
    group.sample_size(10);

    for n in [1_000usize, 5_000] {
        let vectors = random_vectors(n, dim, 42);
        group.bench_with_input(BenchmarkId::new("f32", n), &n, |bench, _| {
            bench.iter(|| {
                let index = build_index(black_box(&vectors), dim, ScalarKind::F32);
                black_box(index.count().unwrap());
            });
        });
    }
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let dim = 128;
    let n = 10_000;
    let vectors = random_vectors(n, dim, 7);
    let queries = random_vectors(100, dim, 1234);

    let mut group = c.benchmark_group("search_k10");
    for quantization in [ScalarKind::F32, ScalarKind::I8] {
        let index = build_index(&vectors, dim, quantization);
        let mut cursor = 0usize;
        group.bench_function(BenchmarkId::new(quantization.name(), n), |bench| {
            bench.iter(|| {
                let query = &queries[cursor % queries.len()];
                cursor += 1;
                let hits = index.search(black_box(query), 10, None).unwrap();
                black_box(hits);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_insert, bench_search);
criterion_main!(benches);
