//! Device discovery results and the CPU/GPU selection policy.

use crate::config::{Config, DevicePreference};
use crate::error::{Error, Result};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Cpu,
    Gpu,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "CPU"),
            Self::Gpu => write!(f, "GPU"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Double-precision floating point support.
    pub fp64: bool,
}

/// A device found while probing a platform.
#[derive(Debug, Clone)]
pub struct DeviceCandidate<D> {
    pub handle: D,
    pub name: String,
    /// Space-separated extension string as reported by the device.
    pub extensions: String,
}

impl<D> DeviceCandidate<D> {
    pub fn new<N: Into<String>, E: Into<String>>(handle: D, name: N, extensions: E) -> Self {
        Self {
            handle,
            name: name.into(),
            extensions: extensions.into(),
        }
    }
}

/// The first CPU and first GPU of the first platform.
///
/// `gpu` is `None` both when the platform has no GPU and when GPU
/// enumeration failed; the selection policy treats the two alike.
#[derive(Debug, Clone)]
pub struct PlatformProbe<D> {
    pub platform_name: String,
    pub cpu: Option<DeviceCandidate<D>>,
    pub gpu: Option<DeviceCandidate<D>>,
}

/// The device a session runs on. Immutable once selected.
#[derive(Debug, Clone)]
pub struct ComputeDevice<D> {
    handle: D,
    kind: DeviceKind,
    name: String,
    platform_name: String,
    extensions: String,
    capabilities: Capabilities,
}

impl<D> ComputeDevice<D> {
    fn from_candidate(
        candidate: DeviceCandidate<D>,
        kind: DeviceKind,
        platform_name: String,
        config: &Config,
    ) -> Self {
        let capabilities = Capabilities {
            fp64: config.supports_fp64(&candidate.extensions),
        };
        Self {
            handle: candidate.handle,
            kind,
            name: candidate.name,
            platform_name,
            extensions: candidate.extensions,
            capabilities,
        }
    }

    pub fn handle(&self) -> &D {
        &self.handle
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn platform_name(&self) -> &str {
        &self.platform_name
    }

    pub fn extensions(&self) -> &str {
        &self.extensions
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

/// Pick the device for a session.
///
/// Under [`DevicePreference::Auto`] a GPU is chosen only when it advertises
/// one of the configured double-precision extensions; in every other case
/// the CPU is used. The choice is never revisited.
pub fn select_device<D>(probe: PlatformProbe<D>, config: &Config) -> Result<ComputeDevice<D>> {
    let PlatformProbe {
        platform_name,
        cpu,
        gpu,
    } = probe;

    let (candidate, kind) = match config.device_preference {
        DevicePreference::Cpu => (
            cpu.ok_or_else(|| Error::no_device(format!("no CPU device on platform '{}'", platform_name)))?,
            DeviceKind::Cpu,
        ),
        DevicePreference::Gpu => (
            gpu.ok_or_else(|| Error::no_device(format!("no GPU device on platform '{}'", platform_name)))?,
            DeviceKind::Gpu,
        ),
        DevicePreference::Auto => match gpu {
            Some(gpu) if config.supports_fp64(&gpu.extensions) => (gpu, DeviceKind::Gpu),
            gpu => {
                if let Some(gpu) = &gpu {
                    tracing::debug!(
                        device = %gpu.name,
                        "GPU lacks double precision support, falling back to CPU"
                    );
                }
                let cpu = cpu.ok_or_else(|| {
                    Error::no_device(format!(
                        "no double-precision GPU and no CPU device on platform '{}'",
                        platform_name
                    ))
                })?;
                (cpu, DeviceKind::Cpu)
            }
        },
    };

    Ok(ComputeDevice::from_candidate(candidate, kind, platform_name, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(cpu: bool, gpu_ext: Option<&str>) -> PlatformProbe<u32> {
        PlatformProbe {
            platform_name: "Test Platform".to_string(),
            cpu: cpu.then(|| DeviceCandidate::new(1, "cpu", "cl_khr_fp64")),
            gpu: gpu_ext.map(|ext| DeviceCandidate::new(2, "gpu", ext)),
        }
    }

    #[test]
    fn test_fp64_gpu_is_preferred() {
        let config = Config::default();
        let device = select_device(probe(true, Some("cl_khr_icd cl_khr_fp64")), &config).unwrap();
        assert_eq!(device.kind(), DeviceKind::Gpu);
        assert_eq!(*device.handle(), 2);
        assert!(device.capabilities().fp64);
    }

    #[test]
    fn test_amd_fp64_marker_counts() {
        let config = Config::default();
        let device = select_device(probe(true, Some("cl_amd_fp64")), &config).unwrap();
        assert_eq!(device.kind(), DeviceKind::Gpu);
    }

    #[test]
    fn test_gpu_without_fp64_falls_back_to_cpu() {
        let config = Config::default();
        let device = select_device(probe(true, Some("cl_khr_fp16")), &config).unwrap();
        assert_eq!(device.kind(), DeviceKind::Cpu);
        assert_eq!(device.platform_name(), "Test Platform");
    }

    #[test]
    fn test_missing_gpu_falls_back_to_cpu() {
        let config = Config::default();
        let device = select_device(probe(true, None), &config).unwrap();
        assert_eq!(device.kind(), DeviceKind::Cpu);
    }

    #[test]
    fn test_no_devices_fails() {
        let config = Config::default();
        let err = select_device(probe(false, None), &config).unwrap_err();
        assert!(matches!(err, Error::NoDevice(_)));
    }

    #[test]
    fn test_gpu_without_fp64_and_no_cpu_fails() {
        let config = Config::default();
        assert!(select_device(probe(false, Some("cl_khr_fp16")), &config).is_err());
    }

    #[test]
    fn test_forced_preferences() {
        let cpu_only = Config::builder().device_preference(DevicePreference::Cpu).build().unwrap();
        let device = select_device(probe(true, Some("cl_khr_fp64")), &cpu_only).unwrap();
        assert_eq!(device.kind(), DeviceKind::Cpu);

        let gpu_only = Config::builder().device_preference(DevicePreference::Gpu).build().unwrap();
        let device = select_device(probe(true, Some("cl_khr_fp16")), &gpu_only).unwrap();
        assert_eq!(device.kind(), DeviceKind::Gpu);
        assert!(!device.capabilities().fp64);

        assert!(select_device(probe(true, None), &gpu_only).is_err());
    }
}
