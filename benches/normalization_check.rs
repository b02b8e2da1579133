//! Benchmarks for the normalization check

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use offload_rs::prelude::*;
use std::path::Path;

fn bench_normalization(c: &mut Criterion) {
    let config = Config::builder()
        .kernel_dir(Path::new(env!("CARGO_MANIFEST_DIR")).join("kernels"))
        .build()
        .unwrap();
    let session = ComputeSession::new(HostBackend::new(), config);
    session.is_uniformly_spaced(&[0.0, 1.0, 2.0]).unwrap();

    let mut group = c.benchmark_group("normalization");
    for len in [1_000usize, 100_000, 1_000_000] {
        let timestamps: Vec<f64> = (0..len).map(|i| i as f64 * 15.0).collect();

        group.bench_with_input(BenchmarkId::new("offload", len), &timestamps, |b, ts| {
            b.iter(|| session.is_uniformly_spaced(black_box(ts)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("host", len), &timestamps, |b, ts| {
            b.iter(|| {
                let distance = ts[1] - ts[0];
                black_box(ts).windows(2).all(|w| w[1] - w[0] == distance)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_normalization);
criterion_main!(benches);
