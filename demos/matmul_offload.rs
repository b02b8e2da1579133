//! Matrix multiplication on the best available compute device
//!
//! Run with `RUST_LOG=debug` to see device selection and kernel builds.

use offload_rs::prelude::*;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn run<B: ComputeBackend>(session: ComputeSession<B>) -> offload_rs::Result<()> {
    let context = session.get_context()?;
    println!(
        "Device: {} ({}) on {}",
        context.device().name(),
        context.device().kind(),
        context.device().platform_name()
    );

    let small_a = Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0]])?;
    let small_b = Matrix::from_rows(&[[5.0, 6.0], [7.0, 8.0]])?;
    println!("\n{}x\n{}=\n{}", small_a, small_b, session.multiply(&small_a, &small_b)?);

    for size in [64usize, 256, 512] {
        let a = Matrix::from_row_major(size, size, (0..size * size).map(|i| (i % 13) as f32 * 0.1).collect())?;
        let b = Matrix::from_row_major(size, size, (0..size * size).map(|i| (i % 7) as f32 - 3.0).collect())?;

        let start = Instant::now();
        let c = session.multiply(&a, &b)?;
        println!("{size}x{size}: {:?} (c[0][0] = {})", start.elapsed(), c.value(0, 0));
    }

    #[cfg(feature = "telemetry")]
    {
        use offload_rs::telemetry::{ConsoleExporter, MetricsExporter};
        ConsoleExporter::new(true).export(&session.metrics().snapshot())?;
    }

    Ok(())
}

fn main() -> offload_rs::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Matrix Multiplication Offload ===\n");

    let config = Config::default();

    #[cfg(feature = "opencl")]
    if OclBackend::is_available() {
        return run(ComputeSession::new(OclBackend::new(), config));
    }

    println!("(no OpenCL runtime, using the reference device)");
    run(ComputeSession::new(HostBackend::new(), config))
}
