//! Session telemetry.
//!
//! Counts initializations, kernel builds and cache hits, dispatches and
//! buffer traffic, and keeps a histogram of kernel execution time.

#[cfg(feature = "telemetry")]
pub mod metrics;

#[cfg(feature = "telemetry")]
pub mod export;

#[cfg(feature = "telemetry")]
pub use metrics::{Metrics, MetricsSnapshot};

#[cfg(feature = "telemetry")]
pub use export::{ConsoleExporter, JsonExporter, MetricsExporter};

// Stub implementations when telemetry is disabled
#[cfg(not(feature = "telemetry"))]
pub mod metrics {
    use std::time::Duration;

    #[derive(Debug, Clone, Default)]
    pub struct Metrics;

    impl Metrics {
        pub fn new() -> Self { Self }
        pub fn record_initialization(&self) {}
        pub fn record_init_failure(&self) {}
        pub fn record_kernel_compiled(&self) {}
        pub fn record_cache_hit(&self) {}
        pub fn record_compile_failure(&self) {}
        pub fn record_dispatch(&self, _: Duration, _: bool) {}
        pub fn record_dispatch_failure(&self) {}
        pub fn record_buffer_allocated(&self) {}
        pub fn record_buffer_released(&self) {}
        pub fn record_upload(&self, _: usize) {}
        pub fn record_download(&self, _: usize) {}
        pub fn snapshot(&self) -> MetricsSnapshot { MetricsSnapshot::default() }
        pub fn reset(&self) {}
    }

    #[derive(Debug, Clone, Default)]
    pub struct MetricsSnapshot {
        pub initializations: u64,
        pub init_failures: u64,
        pub kernels_compiled: u64,
        pub cache_hits: u64,
        pub compile_failures: u64,
        pub dispatches: u64,
        pub dispatch_failures: u64,
        pub buffers_allocated: u64,
        pub buffers_released: u64,
    }
}

#[cfg(not(feature = "telemetry"))]
pub use metrics::{Metrics, MetricsSnapshot};
