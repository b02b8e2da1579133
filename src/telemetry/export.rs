//! Metrics export functionality for various formats.

use super::metrics::MetricsSnapshot;
use crate::error::{Error, Result};

/// Trait for exporting metrics to different formats
pub trait MetricsExporter: Send + Sync {
    fn export(&self, snapshot: &MetricsSnapshot) -> Result<()>;
}

/// Export metrics to a JSON file
pub struct JsonExporter {
    output_path: std::path::PathBuf,
}

impl JsonExporter {
    pub fn new(output_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
        }
    }

    /// Render a snapshot without writing it anywhere.
    pub fn to_json(snapshot: &MetricsSnapshot) -> Result<String> {
        let serializable = SerializableSnapshot::from(snapshot);
        serde_json::to_string_pretty(&serializable)
            .map_err(|e| Error::telemetry(format!("JSON serialization failed: {}", e)))
    }
}

impl MetricsExporter for JsonExporter {
    fn export(&self, snapshot: &MetricsSnapshot) -> Result<()> {
        let json = Self::to_json(snapshot)?;
        std::fs::write(&self.output_path, json)
            .map_err(|e| Error::telemetry(format!("Failed to write file: {}", e)))?;
        Ok(())
    }
}

#[derive(Debug, Clone, serde::Serialize)]
struct SerializableSnapshot {
    uptime_secs: f64,
    initializations: u64,
    init_failures: u64,
    kernels_compiled: u64,
    cache_hits: u64,
    compile_failures: u64,
    cache_hit_ratio: f64,
    dispatches: u64,
    dispatch_failures: u64,
    profiled_dispatches: u64,
    dispatches_per_second: f64,
    buffers_allocated: u64,
    buffers_released: u64,
    uploaded_mb: f64,
    downloaded_mb: f64,
    avg_kernel_us: f64,
    p50_kernel_us: f64,
    p99_kernel_us: f64,
    max_kernel_us: f64,
}

impl From<&MetricsSnapshot> for SerializableSnapshot {
    fn from(snapshot: &MetricsSnapshot) -> Self {
        Self {
            uptime_secs: snapshot.uptime.as_secs_f64(),
            initializations: snapshot.initializations,
            init_failures: snapshot.init_failures,
            kernels_compiled: snapshot.kernels_compiled,
            cache_hits: snapshot.cache_hits,
            compile_failures: snapshot.compile_failures,
            cache_hit_ratio: snapshot.cache_hit_ratio(),
            dispatches: snapshot.dispatches,
            dispatch_failures: snapshot.dispatch_failures,
            profiled_dispatches: snapshot.profiled_dispatches,
            dispatches_per_second: snapshot.dispatches_per_second(),
            buffers_allocated: snapshot.buffers_allocated,
            buffers_released: snapshot.buffers_released,
            uploaded_mb: snapshot.bytes_uploaded as f64 / (1024.0 * 1024.0),
            downloaded_mb: snapshot.bytes_downloaded as f64 / (1024.0 * 1024.0),
            avg_kernel_us: snapshot.avg_kernel_ns as f64 / 1_000.0,
            p50_kernel_us: snapshot.p50_kernel_ns as f64 / 1_000.0,
            p99_kernel_us: snapshot.p99_kernel_ns as f64 / 1_000.0,
            max_kernel_us: snapshot.max_kernel_ns as f64 / 1_000.0,
        }
    }
}

/// Export metrics to stdout
pub struct ConsoleExporter {
    verbose: bool,
}

impl ConsoleExporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl MetricsExporter for ConsoleExporter {
    fn export(&self, snapshot: &MetricsSnapshot) -> Result<()> {
        println!("=== Offload Session Metrics ===");
        println!("Uptime: {:.2}s", snapshot.uptime.as_secs_f64());
        println!(
            "Initializations: {} ({} failed)",
            snapshot.initializations, snapshot.init_failures
        );
        println!(
            "Kernels compiled: {} ({} cache hits, {} failed)",
            snapshot.kernels_compiled, snapshot.cache_hits, snapshot.compile_failures
        );
        println!(
            "Dispatches: {} ({} failed)",
            snapshot.dispatches, snapshot.dispatch_failures
        );

        if self.verbose {
            println!("\nKernel time:");
            println!("  Average: {:.2}μs", snapshot.avg_kernel_ns as f64 / 1_000.0);
            println!("  P50: {:.2}μs", snapshot.p50_kernel_ns as f64 / 1_000.0);
            println!("  P99: {:.2}μs", snapshot.p99_kernel_ns as f64 / 1_000.0);
            println!("  Max: {:.2}μs", snapshot.max_kernel_ns as f64 / 1_000.0);
            println!(
                "  Profiled: {}/{}",
                snapshot.profiled_dispatches, snapshot.dispatches
            );

            println!("\nMemory:");
            println!(
                "  Buffers: {} allocated, {} released",
                snapshot.buffers_allocated, snapshot.buffers_released
            );
            println!(
                "  Uploaded: {:.2}MB",
                snapshot.bytes_uploaded as f64 / (1024.0 * 1024.0)
            );
            println!(
                "  Downloaded: {:.2}MB",
                snapshot.bytes_downloaded as f64 / (1024.0 * 1024.0)
            );
        }

        println!("===============================");

        Ok(())
    }
}

impl Default for ConsoleExporter {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn dummy_snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Instant::now(),
            uptime: Duration::from_secs(10),
            initializations: 1,
            init_failures: 0,
            kernels_compiled: 2,
            cache_hits: 98,
            compile_failures: 0,
            dispatches: 100,
            dispatch_failures: 1,
            profiled_dispatches: 100,
            buffers_allocated: 300,
            buffers_released: 300,
            bytes_uploaded: 1024 * 1024,
            bytes_downloaded: 512 * 1024,
            avg_kernel_ns: 1000,
            p50_kernel_ns: 900,
            p99_kernel_ns: 2000,
            max_kernel_ns: 5000,
        }
    }

    #[test]
    fn test_console_exporter() {
        let exporter = ConsoleExporter::new(true);
        assert!(exporter.export(&dummy_snapshot()).is_ok());
    }

    #[test]
    fn test_json_exporter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offload_metrics.json");
        let exporter = JsonExporter::new(&path);

        exporter.export(&dummy_snapshot()).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["dispatches"], 100);
        assert_eq!(written["cache_hits"], 98);
        assert!((written["cache_hit_ratio"].as_f64().unwrap() - 0.98).abs() < 1e-9);
    }
}
