use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Which device kind the session should pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// GPU when it advertises double precision, CPU otherwise.
    #[default]
    Auto,
    Cpu,
    Gpu,
}

/// A kernel source file and the entry point to extract from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KernelSpec {
    pub file: PathBuf,
    pub entry_point: String,
}

impl KernelSpec {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(file: P, entry_point: S) -> Self {
        Self {
            file: file.into(),
            entry_point: entry_point.into(),
        }
    }

    /// Resolve the file against a kernel directory. Absolute paths are kept.
    pub fn resolve(&self, kernel_dir: &Path) -> PathBuf {
        if self.file.is_absolute() {
            self.file.clone()
        } else {
            kernel_dir.join(&self.file)
        }
    }

    pub fn matrix_multiplication() -> Self {
        Self::new("matrix_multiplication.cl", "matrix_multiplication")
    }

    pub fn check_normalization() -> Self {
        Self::new("_check_normalization.cl", "_check_normalization")
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub kernel_dir: PathBuf,
    pub matmul_kernel: KernelSpec,
    pub normalization_kernel: KernelSpec,

    /// Preferred local work-group for the 2-D matrix multiply dispatch.
    pub work_group: (usize, usize),

    pub device_preference: DevicePreference,
    pub fp64_extensions: Vec<String>,

    /// Create the command queue with profiling so kernel time is measured.
    pub profiling: bool,

    pub thread_name_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kernel_dir: PathBuf::from("kernels"),
            matmul_kernel: KernelSpec::matrix_multiplication(),
            normalization_kernel: KernelSpec::check_normalization(),
            work_group: (8, 8),
            device_preference: DevicePreference::default(),
            fp64_extensions: vec!["cl_khr_fp64".to_string(), "cl_amd_fp64".to_string()],
            profiling: true,
            thread_name_prefix: "offload-worker".to_string(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        let (x, y) = self.work_group;
        if x == 0 || y == 0 {
            return Err(Error::config("work_group dimensions must be > 0"));
        }

        for spec in [&self.matmul_kernel, &self.normalization_kernel] {
            if spec.file.as_os_str().is_empty() {
                return Err(Error::config("kernel file must not be empty"));
            }
            if spec.entry_point.trim().is_empty() {
                return Err(Error::config(format!(
                    "entry point for {} must not be empty",
                    spec.file.display()
                )));
            }
        }

        if self.fp64_extensions.iter().all(|ext| ext.trim().is_empty()) {
            return Err(Error::config("fp64_extensions must name at least one extension"));
        }

        Ok(())
    }

    /// True when `extensions` advertises one of the configured fp64 markers.
    pub fn supports_fp64(&self, extensions: &str) -> bool {
        self.fp64_extensions
            .iter()
            .filter(|ext| !ext.is_empty())
            .any(|ext| extensions.split_whitespace().any(|e| e == ext))
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn kernel_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.kernel_dir = dir.into();
        self
    }

    pub fn matmul_kernel(mut self, spec: KernelSpec) -> Self {
        self.config.matmul_kernel = spec;
        self
    }

    pub fn normalization_kernel(mut self, spec: KernelSpec) -> Self {
        self.config.normalization_kernel = spec;
        self
    }

    pub fn work_group(mut self, x: usize, y: usize) -> Self {
        self.config.work_group = (x, y);
        self
    }

    pub fn device_preference(mut self, preference: DevicePreference) -> Self {
        self.config.device_preference = preference;
        self
    }

    pub fn fp64_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.fp64_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn profiling(mut self, enable: bool) -> Self {
        self.config.profiling = enable;
        self
    }

    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
