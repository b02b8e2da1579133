//! Error taxonomy for the compute-provider subsystem.
//!
//! Every variant names the stage that failed so a caller can diagnose a
//! failure without re-running it. Compile failures carry the compiler's
//! build log verbatim.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("platform enumeration failed: {0}")]
    Platform(String),

    #[error("no usable compute device: {0}")]
    NoDevice(String),

    #[error("could not create compute context: {0}")]
    Context(String),

    #[error("could not create command queue: {0}")]
    Queue(String),

    #[error("could not find kernel file {}: {source}", path.display())]
    KernelSourceNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not create program from source {source_id}: {message}")]
    ProgramCreate { source_id: String, message: String },

    #[error("could not build program {source_id}.\n\n{log}")]
    KernelCompile { source_id: String, log: String },

    #[error("kernel entry point '{entry_point}' not found in {source_id}: {message}")]
    EntryPointNotFound {
        source_id: String,
        entry_point: String,
        message: String,
    },

    #[error("device buffer allocation failed for {label}: {message}")]
    BufferAllocation { label: String, message: String },

    #[error("device transfer failed for {label}: {message}")]
    Transfer { label: String, message: String },

    #[error("failed to bind kernel argument {index} of '{kernel}': {message}")]
    KernelArgument {
        kernel: String,
        index: usize,
        message: String,
    },

    #[error("kernel dispatch failed for '{kernel}': {message}")]
    Dispatch { kernel: String, message: String },

    #[error("command queue synchronization failed: {0}")]
    Synchronization(String),

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("telemetry error: {0}")]
    Telemetry(String),

    #[cfg(feature = "async")]
    #[error("async error: {0}")]
    Async(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure taxonomy used for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Platform or device enumeration; no device is usable.
    DeviceEnumeration,
    /// Context or queue creation; retryable by a fresh initialization.
    SessionSetup,
    /// The kernel source could not be read.
    KernelSource,
    /// Program creation, build, or entry point extraction.
    KernelCompile,
    /// Buffers, argument binding, dispatch, transfers, synchronization.
    Execution,
    /// Caller-supplied data was rejected before any device work.
    Input,
    Configuration,
    Other,
}

impl Error {
    pub fn platform<S: Into<String>>(msg: S) -> Self {
        Error::Platform(msg.into())
    }

    pub fn no_device<S: Into<String>>(msg: S) -> Self {
        Error::NoDevice(msg.into())
    }

    pub fn context<S: Into<String>>(msg: S) -> Self {
        Error::Context(msg.into())
    }

    pub fn queue<S: Into<String>>(msg: S) -> Self {
        Error::Queue(msg.into())
    }

    pub fn compile<S: Into<String>, L: Into<String>>(source_id: S, log: L) -> Self {
        Error::KernelCompile {
            source_id: source_id.into(),
            log: log.into(),
        }
    }

    pub fn allocation<S: Into<String>, M: Into<String>>(label: S, msg: M) -> Self {
        Error::BufferAllocation {
            label: label.into(),
            message: msg.into(),
        }
    }

    pub fn transfer<S: Into<String>, M: Into<String>>(label: S, msg: M) -> Self {
        Error::Transfer {
            label: label.into(),
            message: msg.into(),
        }
    }

    pub fn kernel_argument<S: Into<String>, M: Into<String>>(kernel: S, index: usize, msg: M) -> Self {
        Error::KernelArgument {
            kernel: kernel.into(),
            index,
            message: msg.into(),
        }
    }

    pub fn dispatch<S: Into<String>, M: Into<String>>(kernel: S, msg: M) -> Self {
        Error::Dispatch {
            kernel: kernel.into(),
            message: msg.into(),
        }
    }

    pub fn synchronization<S: Into<String>>(msg: S) -> Self {
        Error::Synchronization(msg.into())
    }

    pub fn dimension_mismatch<S: Into<String>>(msg: S) -> Self {
        Error::DimensionMismatch(msg.into())
    }

    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn telemetry<S: Into<String>>(msg: S) -> Self {
        Error::Telemetry(msg.into())
    }

    #[cfg(feature = "async")]
    pub fn async_error<S: Into<String>>(msg: S) -> Self {
        Error::Async(msg.into())
    }

    /// Classify this error into the failure taxonomy.
    pub fn stage(&self) -> Stage {
        match self {
            Error::Platform(_) | Error::NoDevice(_) => Stage::DeviceEnumeration,
            Error::Context(_) | Error::Queue(_) => Stage::SessionSetup,
            Error::KernelSourceNotFound { .. } => Stage::KernelSource,
            Error::ProgramCreate { .. }
            | Error::KernelCompile { .. }
            | Error::EntryPointNotFound { .. } => Stage::KernelCompile,
            Error::BufferAllocation { .. }
            | Error::Transfer { .. }
            | Error::KernelArgument { .. }
            | Error::Dispatch { .. }
            | Error::Synchronization(_) => Stage::Execution,
            Error::DimensionMismatch(_) | Error::InvalidArgument(_) => Stage::Input,
            Error::Config(_) => Stage::Configuration,
            #[cfg(feature = "async")]
            Error::Async(_) => Stage::Other,
            Error::Telemetry(_) | Error::Io(_) => Stage::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_embeds_log() {
        let err = Error::compile("kernels/bad.cl", "<source>:3:5: error: use of undeclared identifier 'x'");
        let message = err.to_string();
        assert!(message.contains("kernels/bad.cl"));
        assert!(message.contains("<source>:3:5: error: use of undeclared identifier 'x'"));
        assert_eq!(err.stage(), Stage::KernelCompile);
    }

    #[test]
    fn test_source_not_found_names_path() {
        let err = Error::KernelSourceNotFound {
            path: PathBuf::from("kernels/missing.cl"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("kernels/missing.cl"));
        assert_eq!(err.stage(), Stage::KernelSource);
    }

    #[test]
    fn test_stages() {
        assert_eq!(Error::platform("x").stage(), Stage::DeviceEnumeration);
        assert_eq!(Error::context("x").stage(), Stage::SessionSetup);
        assert_eq!(Error::queue("x").stage(), Stage::SessionSetup);
        assert_eq!(Error::dispatch("k", "x").stage(), Stage::Execution);
        assert_eq!(Error::kernel_argument("k", 3, "x").stage(), Stage::Execution);
        assert_eq!(Error::dimension_mismatch("x").stage(), Stage::Input);
        assert_eq!(Error::config("x").stage(), Stage::Configuration);
    }

    #[test]
    fn test_argument_error_names_index() {
        let err = Error::kernel_argument("matrix_multiplication", 3, "invalid arg size");
        let message = err.to_string();
        assert!(message.contains("argument 3"));
        assert!(message.contains("matrix_multiplication"));
    }
}
