//! The seam between the session and a concrete compute API.
//!
//! A backend knows how to probe a platform, create a context and command
//! queue, build kernels from source, move data between host and device,
//! and enqueue kernels. Everything above this trait (device selection,
//! the kernel cache, buffer scoping, the pipelines) is backend-agnostic.

pub mod host;

#[cfg(feature = "opencl")]
pub mod opencl;

pub use host::HostBackend;

#[cfg(feature = "opencl")]
pub use opencl::OclBackend;

use crate::device::PlatformProbe;
use crate::error::Result;
use std::time::Duration;

/// Element type of a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElemType {
    F32,
    F64,
    I32,
}

impl ElemType {
    pub fn size(self) -> usize {
        match self {
            ElemType::F32 => std::mem::size_of::<f32>(),
            ElemType::F64 => std::mem::size_of::<f64>(),
            ElemType::I32 => std::mem::size_of::<i32>(),
        }
    }
}

/// Borrowed host data to upload.
#[derive(Debug, Clone, Copy)]
pub enum HostSlice<'a> {
    F32(&'a [f32]),
    F64(&'a [f64]),
    I32(&'a [i32]),
}

impl HostSlice<'_> {
    pub fn elem(&self) -> ElemType {
        match self {
            HostSlice::F32(_) => ElemType::F32,
            HostSlice::F64(_) => ElemType::F64,
            HostSlice::I32(_) => ElemType::I32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            HostSlice::F32(d) => d.len(),
            HostSlice::F64(d) => d.len(),
            HostSlice::I32(d) => d.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_len(&self) -> usize {
        self.len() * self.elem().size()
    }
}

/// Borrowed host memory to download into.
#[derive(Debug)]
pub enum HostSliceMut<'a> {
    F32(&'a mut [f32]),
    F64(&'a mut [f64]),
    I32(&'a mut [i32]),
}

impl HostSliceMut<'_> {
    pub fn elem(&self) -> ElemType {
        match self {
            HostSliceMut::F32(_) => ElemType::F32,
            HostSliceMut::F64(_) => ElemType::F64,
            HostSliceMut::I32(_) => ElemType::I32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            HostSliceMut::F32(d) => d.len(),
            HostSliceMut::F64(d) => d.len(),
            HostSliceMut::I32(d) => d.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_len(&self) -> usize {
        self.len() * self.elem().size()
    }
}

/// Kernel-side access to a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemAccess {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// How a new buffer is initialized.
#[derive(Debug, Clone, Copy)]
pub enum BufferInit<'a> {
    /// Copy host data into the buffer at allocation time.
    CopyFrom(HostSlice<'a>),
    /// Leave contents undefined.
    Uninit { elem: ElemType, len: usize },
}

impl BufferInit<'_> {
    pub fn elem(&self) -> ElemType {
        match self {
            BufferInit::CopyFrom(data) => data.elem(),
            BufferInit::Uninit { elem, .. } => *elem,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            BufferInit::CopyFrom(data) => data.len(),
            BufferInit::Uninit { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One positional kernel argument.
#[derive(Debug)]
pub enum KernelArg<'a, Buf> {
    Buffer(&'a Buf),
    Int(i32),
    Float(f32),
    Double(f64),
}

impl<Buf> KernelArg<'_, Buf> {
    pub fn describe(&self) -> &'static str {
        match self {
            KernelArg::Buffer(_) => "buffer",
            KernelArg::Int(_) => "int",
            KernelArg::Float(_) => "float",
            KernelArg::Double(_) => "double",
        }
    }
}

/// Global and local index space of one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NdRange {
    pub dims: u32,
    pub global: [usize; 3],
    pub local: Option<[usize; 3]>,
}

impl NdRange {
    /// A 1-D range with a runtime-chosen work-group size.
    pub fn one_d(global: usize) -> Self {
        Self {
            dims: 1,
            global: [global, 1, 1],
            local: None,
        }
    }

    /// A 2-D range whose work-group evenly divides the global size.
    ///
    /// Each local dimension is `gcd(global, preferred)`, so a preferred
    /// (8, 8) group stays (8, 8) on multiples of 8 and shrinks otherwise.
    pub fn two_d(global: [usize; 2], preferred_local: (usize, usize)) -> Self {
        let local_x = gcd(global[0], preferred_local.0).max(1);
        let local_y = gcd(global[1], preferred_local.1).max(1);
        Self {
            dims: 2,
            global: [global[0], global[1], 1],
            local: Some([local_x, local_y, 1]),
        }
    }

    pub fn work_items(&self) -> usize {
        self.global.iter().take(self.dims as usize).product()
    }
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Timing captured for one dispatch, available after the queue finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchTiming {
    pub kernel_time: Option<Duration>,
}

/// A compute API the session can drive.
///
/// All calls are synchronous from the host's point of view except
/// [`enqueue_kernel`](Self::enqueue_kernel), which only submits work; the
/// caller is expected to `flush` and `finish` before reading results.
pub trait ComputeBackend: Send + Sync + 'static {
    type Device: Clone + Send + Sync + std::fmt::Debug;
    type Context: Send + Sync;
    type Queue: Send + Sync;
    type Kernel: Send + Sync;
    type Buffer: Send + Sync;
    type Event: Send;

    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Enumerate the first platform and its first CPU and GPU device.
    fn probe_platform(&self) -> Result<PlatformProbe<Self::Device>>;

    fn create_context(&self, device: &Self::Device) -> Result<Self::Context>;

    fn create_queue(
        &self,
        context: &Self::Context,
        device: &Self::Device,
        profiling: bool,
    ) -> Result<Self::Queue>;

    /// Compile `source` and extract `entry_point`.
    ///
    /// A build failure must surface the compiler's log through
    /// [`Error::KernelCompile`](crate::Error::KernelCompile).
    fn build_kernel(
        &self,
        context: &Self::Context,
        device: &Self::Device,
        source_id: &str,
        source: &str,
        entry_point: &str,
    ) -> Result<Self::Kernel>;

    /// Allocate device memory. The allocation is released when the
    /// returned buffer is dropped.
    fn create_buffer(
        &self,
        context: &Self::Context,
        label: &str,
        access: MemAccess,
        init: BufferInit<'_>,
    ) -> Result<Self::Buffer>;

    /// Blocking host-to-device copy.
    fn write_buffer(
        &self,
        queue: &Self::Queue,
        label: &str,
        buffer: &Self::Buffer,
        data: HostSlice<'_>,
    ) -> Result<()>;

    /// Blocking device-to-host copy.
    fn read_buffer(
        &self,
        queue: &Self::Queue,
        label: &str,
        buffer: &Self::Buffer,
        out: HostSliceMut<'_>,
    ) -> Result<()>;

    /// Bind `args` in order and submit the kernel over `range`.
    fn enqueue_kernel(
        &self,
        queue: &Self::Queue,
        kernel: &Self::Kernel,
        args: &[KernelArg<'_, Self::Buffer>],
        range: &NdRange,
    ) -> Result<Self::Event>;

    fn flush(&self, queue: &Self::Queue) -> Result<()>;

    /// Block until every command submitted to `queue` has completed.
    fn finish(&self, queue: &Self::Queue) -> Result<()>;

    /// Profiling data for a completed dispatch, if the queue recorded it.
    fn timing(&self, event: &Self::Event) -> DispatchTiming;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_d_keeps_preferred_group_on_multiples() {
        let range = NdRange::two_d([64, 16], (8, 8));
        assert_eq!(range.local, Some([8, 8, 1]));
        assert_eq!(range.work_items(), 1024);
    }

    #[test]
    fn test_two_d_shrinks_group_to_divisor() {
        let range = NdRange::two_d([2, 12], (8, 8));
        assert_eq!(range.local, Some([2, 4, 1]));

        let range = NdRange::two_d([7, 9], (8, 8));
        assert_eq!(range.local, Some([1, 1, 1]));
    }

    #[test]
    fn test_one_d_range() {
        let range = NdRange::one_d(99);
        assert_eq!(range.dims, 1);
        assert_eq!(range.local, None);
        assert_eq!(range.work_items(), 99);
    }

    #[test]
    fn test_slice_sizes() {
        let data = [1.0f64, 2.0, 3.0];
        let slice = HostSlice::F64(&data);
        assert_eq!(slice.elem(), ElemType::F64);
        assert_eq!(slice.byte_len(), 24);

        let init = BufferInit::Uninit {
            elem: ElemType::I32,
            len: 1,
        };
        assert_eq!(init.len(), 1);
        assert_eq!(init.elem().size(), 4);
    }
}
