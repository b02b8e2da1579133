pub use crate::backend::host::{Fault, HostBackend};
pub use crate::backend::ComputeBackend;
pub use crate::config::{Config, ConfigBuilder, DevicePreference, KernelSpec};
pub use crate::device::DeviceKind;
pub use crate::error::{Error, Result, Stage};
pub use crate::matrix::{Matrix, MatrixLike};
pub use crate::session::ComputeSession;
pub use crate::timeseries::{TimeSeries, TimeSeriesLike};

#[cfg(feature = "opencl")]
pub use crate::backend::opencl::OclBackend;

#[cfg(feature = "telemetry")]
pub use crate::telemetry::{Metrics, MetricsSnapshot};

#[cfg(feature = "async")]
pub use crate::async_bridge::{block_on, offload, OffloadHandle};
