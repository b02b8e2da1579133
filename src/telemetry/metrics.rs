//! Counters and kernel-time histogram for one compute session.

use hdrhistogram::Histogram;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Session metrics collector
#[derive(Debug)]
pub struct Metrics {
    // Session setup
    initializations: AtomicU64,
    init_failures: AtomicU64,

    // Kernel cache
    kernels_compiled: AtomicU64,
    cache_hits: AtomicU64,
    compile_failures: AtomicU64,

    // Execution
    dispatches: AtomicU64,
    dispatch_failures: AtomicU64,
    profiled_dispatches: AtomicU64,

    // Memory traffic
    buffers_allocated: AtomicU64,
    buffers_released: AtomicU64,
    bytes_uploaded: AtomicU64,
    bytes_downloaded: AtomicU64,

    // Kernel execution time in nanoseconds
    kernel_time: RwLock<Histogram<u64>>,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        // 3 significant figures, up to one hour in nanoseconds
        let histogram =
            Histogram::new_with_max(3_600_000_000_000, 3).expect("constant histogram bounds are valid");

        Self {
            initializations: AtomicU64::new(0),
            init_failures: AtomicU64::new(0),
            kernels_compiled: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            compile_failures: AtomicU64::new(0),
            dispatches: AtomicU64::new(0),
            dispatch_failures: AtomicU64::new(0),
            profiled_dispatches: AtomicU64::new(0),
            buffers_allocated: AtomicU64::new(0),
            buffers_released: AtomicU64::new(0),
            bytes_uploaded: AtomicU64::new(0),
            bytes_downloaded: AtomicU64::new(0),
            kernel_time: RwLock::new(histogram),
            start_time: Instant::now(),
        }
    }

    pub fn record_initialization(&self) {
        self.initializations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_init_failure(&self) {
        self.init_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_kernel_compiled(&self) {
        self.kernels_compiled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_compile_failure(&self) {
        self.compile_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed dispatch.
    ///
    /// `profiled` says whether `kernel_time` came from queue profiling or
    /// from the host wall clock.
    pub fn record_dispatch(&self, kernel_time: Duration, profiled: bool) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
        if profiled {
            self.profiled_dispatches.fetch_add(1, Ordering::Relaxed);
        }

        let nanos = u64::try_from(kernel_time.as_nanos()).unwrap_or(u64::MAX);
        if let Some(mut hist) = self.kernel_time.try_write() {
            let _ = hist.record(nanos.max(1));
        }
    }

    pub fn record_dispatch_failure(&self) {
        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_buffer_allocated(&self) {
        self.buffers_allocated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_buffer_released(&self) {
        self.buffers_released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upload(&self, bytes: usize) {
        self.bytes_uploaded.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_download(&self, bytes: usize) {
        self.bytes_downloaded.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let histogram = self.kernel_time.read();

        MetricsSnapshot {
            timestamp: Instant::now(),
            uptime: self.start_time.elapsed(),
            initializations: self.initializations.load(Ordering::Relaxed),
            init_failures: self.init_failures.load(Ordering::Relaxed),
            kernels_compiled: self.kernels_compiled.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            compile_failures: self.compile_failures.load(Ordering::Relaxed),
            dispatches: self.dispatches.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            profiled_dispatches: self.profiled_dispatches.load(Ordering::Relaxed),
            buffers_allocated: self.buffers_allocated.load(Ordering::Relaxed),
            buffers_released: self.buffers_released.load(Ordering::Relaxed),
            bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            avg_kernel_ns: if histogram.len() > 0 {
                histogram.mean() as u64
            } else {
                0
            },
            p50_kernel_ns: histogram.value_at_quantile(0.50),
            p99_kernel_ns: histogram.value_at_quantile(0.99),
            max_kernel_ns: histogram.max(),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.initializations,
            &self.init_failures,
            &self.kernels_compiled,
            &self.cache_hits,
            &self.compile_failures,
            &self.dispatches,
            &self.dispatch_failures,
            &self.profiled_dispatches,
            &self.buffers_allocated,
            &self.buffers_released,
            &self.bytes_uploaded,
            &self.bytes_downloaded,
        ] {
            counter.store(0, Ordering::Relaxed);
        }

        if let Some(mut hist) = self.kernel_time.try_write() {
            hist.reset();
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub timestamp: Instant,
    pub uptime: Duration,
    pub initializations: u64,
    pub init_failures: u64,
    pub kernels_compiled: u64,
    pub cache_hits: u64,
    pub compile_failures: u64,
    pub dispatches: u64,
    pub dispatch_failures: u64,
    pub profiled_dispatches: u64,
    pub buffers_allocated: u64,
    pub buffers_released: u64,
    pub bytes_uploaded: u64,
    pub bytes_downloaded: u64,
    pub avg_kernel_ns: u64,
    pub p50_kernel_ns: u64,
    pub p99_kernel_ns: u64,
    pub max_kernel_ns: u64,
}

impl MetricsSnapshot {
    /// Fraction of kernel lookups served from the cache (0.0 to 1.0)
    pub fn cache_hit_ratio(&self) -> f64 {
        let lookups = self.cache_hits + self.kernels_compiled;
        if lookups == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / lookups as f64
    }

    pub fn dispatches_per_second(&self) -> f64 {
        let seconds = self.uptime.as_secs_f64();
        if seconds == 0.0 {
            return 0.0;
        }
        self.dispatches as f64 / seconds
    }

    /// Allocations not yet matched by a release.
    pub fn buffers_outstanding(&self) -> u64 {
        self.buffers_allocated.saturating_sub(self.buffers_released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_basic() {
        let metrics = Metrics::new();

        metrics.record_kernel_compiled();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_dispatch(Duration::from_micros(5), true);
        metrics.record_dispatch(Duration::from_micros(15), false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.dispatches, 2);
        assert_eq!(snapshot.profiled_dispatches, 1);
        assert!(snapshot.avg_kernel_ns > 0);
        assert!((snapshot.cache_hit_ratio() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_buffer_accounting() {
        let metrics = Metrics::new();
        metrics.record_buffer_allocated();
        metrics.record_buffer_allocated();
        metrics.record_buffer_released();
        metrics.record_upload(128);
        metrics.record_download(32);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.buffers_outstanding(), 1);
        assert_eq!(snapshot.bytes_uploaded, 128);
        assert_eq!(snapshot.bytes_downloaded, 32);
    }

    #[test]
    fn test_metrics_reset() {
        let metrics = Metrics::new();

        metrics.record_dispatch(Duration::from_nanos(1000), true);
        assert_eq!(metrics.snapshot().dispatches, 1);

        metrics.reset();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.dispatches, 0);
        assert_eq!(snapshot.max_kernel_ns, 0);
    }
}
