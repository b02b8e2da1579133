//! Tests against the system OpenCL runtime. Skipped when no platform is
//! installed.

#![cfg(feature = "opencl")]

use offload_rs::prelude::*;
use std::path::Path;

fn session() -> Option<ComputeSession<OclBackend>> {
    if !OclBackend::is_available() {
        eprintln!("no OpenCL platform, skipping");
        return None;
    }
    let config = Config::builder()
        .kernel_dir(Path::new(env!("CARGO_MANIFEST_DIR")).join("kernels"))
        .build()
        .unwrap();
    Some(ComputeSession::new(OclBackend::new(), config))
}

#[test]
fn test_opencl_known_product() {
    let Some(session) = session() else { return };
    let a = Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();
    let b = Matrix::from_rows(&[[5.0, 6.0], [7.0, 8.0]]).unwrap();

    let c = session.multiply(&a, &b).unwrap();
    assert_eq!(c.as_slice(), &[19.0, 22.0, 43.0, 50.0]);
    assert_eq!(session.live_buffers(), 0);
}

#[test]
fn test_opencl_larger_product() {
    let Some(session) = session() else { return };
    let a = Matrix::from_row_major(24, 40, (0..960).map(|i| (i % 7) as f32 * 0.5).collect()).unwrap();
    let b = Matrix::from_row_major(40, 16, (0..640).map(|i| (i % 5) as f32 - 2.0).collect()).unwrap();

    let device = session.multiply(&a, &b).unwrap();
    let host = a.multiply_naive(&b).unwrap();
    for (d, h) in device.as_slice().iter().zip(host.as_slice()) {
        assert!((d - h).abs() < 1e-3);
    }
}

#[test]
fn test_opencl_normalization() {
    let Some(session) = session() else { return };
    if !session.get_context().unwrap().device().capabilities().fp64 {
        eprintln!("device lacks fp64, skipping");
        return;
    }
    assert!(session.is_uniformly_spaced(&[0.0, 1.0, 2.0, 3.0]).unwrap());
    assert!(!session.is_uniformly_spaced(&[0.0, 1.0, 2.0, 4.0]).unwrap());
}

#[test]
fn test_opencl_compile_error_carries_log() {
    let Some(session) = session() else { return };
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.cl");
    std::fs::write(&path, "__kernel void broken(__global flaot* x) { x[0] = 1; }\n").unwrap();

    let err = session.get_kernel(&KernelSpec::new(&path, "broken")).unwrap_err();
    assert!(matches!(err, Error::KernelCompile { .. }));
    assert!(session.kernel_cache().is_empty());
}

#[test]
fn test_missing_platform_is_an_error() {
    // Runs on every machine: without a platform the session must report
    // enumeration failure instead of panicking.
    let session = ComputeSession::new(OclBackend::new(), Config::default());
    let result = session.get_context();

    if OclBackend::is_available() {
        assert!(!matches!(result, Err(Error::Platform(_))));
    } else {
        let err = result.unwrap_err();
        assert!(matches!(err, Error::Platform(_)));
        assert_eq!(err.stage(), Stage::DeviceEnumeration);
        assert!(!session.is_initialized());
    }
}
