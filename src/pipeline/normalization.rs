//! Constant-spacing check for time-series timestamps.

use crate::backend::{BufferInit, ComputeBackend, ElemType, HostSlice, HostSliceMut, KernelArg, MemAccess, NdRange};
use crate::error::Result;
use crate::session::ComputeSession;
use crate::timeseries::TimeSeriesLike;

/// True when every consecutive timestamp difference equals the first one.
///
/// Differences are compared exactly, in `f64`. Fewer than three
/// timestamps are trivially uniform and never touch the device.
///
/// Blocks until the device has finished; there is no timeout.
pub fn is_uniformly_spaced<B: ComputeBackend>(session: &ComputeSession<B>, timestamps: &[f64]) -> Result<bool> {
    let n = timestamps.len();
    if n < 3 {
        return Ok(true);
    }

    let context = session.get_context()?;
    let kernel = session.get_kernel(&session.config().normalization_kernel)?;

    let distance = timestamps[1] - timestamps[0];

    let ts = session.alloc_buffer(
        &context,
        "timestamps",
        MemAccess::ReadOnly,
        BufferInit::Uninit {
            elem: ElemType::F64,
            len: n,
        },
    )?;
    session.write_buffer(&context, &ts, HostSlice::F64(timestamps))?;

    let flag = session.alloc_buffer(
        &context,
        "flag",
        MemAccess::ReadWrite,
        BufferInit::Uninit {
            elem: ElemType::I32,
            len: 1,
        },
    )?;
    session.write_buffer(&context, &flag, HostSlice::I32(&[0]))?;

    // Work item i compares t[i + 1] - t[i]; concurrent writers only ever
    // store the same value into the flag.
    let args = [KernelArg::Double(distance), ts.arg(), flag.arg()];
    session.dispatch(&context, &kernel, &args, &NdRange::one_d(n - 1))?;

    let mut result = [0i32];
    session.read_buffer(&context, &flag, HostSliceMut::I32(&mut result))?;

    Ok(result[0] == 0)
}

/// [`is_uniformly_spaced`] over the timestamps of `series`.
pub fn check_normalization<B, T>(session: &ComputeSession<B>, series: &T) -> Result<bool>
where
    B: ComputeBackend,
    T: TimeSeriesLike + ?Sized,
{
    is_uniformly_spaced(session, &series.timestamps())
}
