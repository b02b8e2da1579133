//! Checking time series for constant timestamp spacing

use offload_rs::prelude::*;
use tracing_subscriber::EnvFilter;

fn run<B: ComputeBackend>(session: ComputeSession<B>) -> offload_rs::Result<()> {
    let hourly: TimeSeries = (0..24 * 365)
        .map(|h| (1_700_000_000.0 + h as f64 * 3600.0, (h % 24) as f64))
        .collect();
    println!("Hourly series, {} entries: normalized = {}", hourly.len(), session.check_normalization(&hourly)?);

    let mut gappy = hourly.clone();
    gappy.add_entry(1_700_000_000.0 + 24.0 * 365.0 * 3600.0 + 1800.0, 0.0);
    println!("With a half-hour gap at the end: normalized = {}", session.check_normalization(&gappy)?);

    println!("Two entries: normalized = {}", session.is_uniformly_spaced(&[0.0, 42.0])?);

    Ok(())
}

fn main() -> offload_rs::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Time Series Normalization Check ===\n");

    let config = Config::default();

    #[cfg(feature = "opencl")]
    if OclBackend::is_available() {
        return run(ComputeSession::new(OclBackend::new(), config));
    }

    run(ComputeSession::new(HostBackend::new(), config))
}
