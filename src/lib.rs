//! offload-rs - matrix multiplication and time-series checks on compute devices
//!
//! Offloads two dense numeric kernels onto an OpenCL device: a GPU when it
//! supports double precision, the CPU otherwise. The crate owns device
//! selection, the context and command-queue lifecycle, kernel compilation
//! with caching, and the buffer pipelines that feed the kernels.
//!
//! # Quick Start
//!
//! ```no_run
//! use offload_rs::prelude::*;
//!
//! let session = ComputeSession::new(HostBackend::new(), Config::default());
//!
//! let a = Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();
//! let b = Matrix::from_rows(&[[5.0, 6.0], [7.0, 8.0]]).unwrap();
//! let c = session.multiply(&a, &b).unwrap();
//! assert_eq!(c.as_slice(), &[19.0, 22.0, 43.0, 50.0]);
//!
//! assert!(session.is_uniformly_spaced(&[0.0, 1.0, 2.0, 3.0]).unwrap());
//! ```
//!
//! # Features
//!
//! - **Lazy sessions**: nothing touches the device until the first call,
//!   and initialization runs once even under concurrent first calls
//! - **Kernel cache**: each (source file, entry point) compiles once
//! - **Scoped device memory**: buffers are released on every exit path
//! - **OpenCL backend**: via the `ocl` crate (feature `opencl`)
//! - **Reference device**: an in-process backend for tests and machines
//!   without an OpenCL driver
//! - **Telemetry**: counters and kernel-time histogram (feature `telemetry`)
//! - **Async bridge**: await blocking calls from async code (feature `async`)

#![warn(missing_debug_implementations)]

pub mod backend;
pub mod config;
pub mod device;
pub mod error;
pub mod kernel;
pub mod matrix;
pub mod pipeline;
pub mod prelude;
pub mod session;
pub mod telemetry;
pub mod timeseries;

#[cfg(feature = "async")]
pub mod async_bridge;

pub use backend::{ComputeBackend, HostBackend};
pub use config::{Config, ConfigBuilder, DevicePreference, KernelSpec};
pub use device::{ComputeDevice, DeviceKind};
pub use error::{Error, Result, Stage};
pub use matrix::{Matrix, MatrixLike};
pub use session::{ComputeContext, ComputeSession, DeviceBuffer, QueueHandle};
pub use timeseries::{TimeSeries, TimeSeriesLike};

#[cfg(feature = "opencl")]
pub use backend::OclBackend;
