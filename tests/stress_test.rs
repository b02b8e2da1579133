//! Stress tests for compute sessions

use offload_rs::prelude::*;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use std::path::Path;
use std::sync::Arc;

fn session(backend: HostBackend) -> Arc<ComputeSession<HostBackend>> {
    let config = Config::builder()
        .kernel_dir(Path::new(env!("CARGO_MANIFEST_DIR")).join("kernels"))
        .build()
        .unwrap();
    Arc::new(ComputeSession::new(backend, config))
}

#[test]
#[ignore] // Run with --ignored flag
fn stress_test_concurrent_first_calls() {
    for _ in 0..50 {
        let backend = HostBackend::new();
        let session = session(backend.clone());
        let barrier = Arc::new(std::sync::Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let session = Arc::clone(&session);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    if i % 2 == 0 {
                        let a = Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();
                        session.multiply(&a, &a).map(|_| ())
                    } else {
                        session.is_uniformly_spaced(&[0.0, 1.0, 2.0]).map(|_| ())
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let stats = backend.stats();
        assert_eq!(stats.probes, 1);
        assert_eq!(stats.contexts_created, 1);
        assert_eq!(stats.builds, 2);
        assert_eq!(session.live_buffers(), 0);
    }
}

#[test]
#[ignore]
fn stress_test_many_mixed_calls_with_faults() {
    let backend = HostBackend::new();
    let session = session(backend.clone());
    let failures = Arc::new(Mutex::new(0usize));

    let handles: Vec<_> = (0..8u64)
        .map(|seed| {
            let session = Arc::clone(&session);
            let backend = backend.clone();
            let failures = Arc::clone(&failures);
            std::thread::spawn(move || {
                let mut rng = Pcg64::seed_from_u64(seed);
                for _ in 0..200 {
                    if rng.gen_bool(0.05) {
                        backend.fail_next(Fault::Dispatch, 1);
                    }
                    let n = rng.gen_range(1..24);
                    let data = (0..n * n).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
                    let a = Matrix::from_row_major(n, n, data).unwrap();
                    if session.multiply(&a, &a).is_err() {
                        *failures.lock() += 1;
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    backend.clear_faults();
    assert!(*failures.lock() > 0);
    assert_eq!(session.live_buffers(), 0);
    assert_eq!(backend.live_buffers(), 0);
    assert_eq!(backend.stats().builds, 1);
}

#[test]
#[ignore]
fn stress_test_large_series() {
    let session = session(HostBackend::new());
    let timestamps: Vec<f64> = (0..1_000_000).map(|i| i as f64 * 0.5).collect();
    assert!(session.is_uniformly_spaced(&timestamps).unwrap());
}
