//! Lazily initialized compute session.
//!
//! A [`ComputeSession`] owns one backend, one device, one context and one
//! command queue, plus the kernel cache for that context. Nothing touches
//! the device until the first accessor call; initialization then runs
//! exactly once, even under concurrent first calls. A failed
//! initialization leaves the session untouched so the next call retries.
//!
//! All execution helpers block until the device has finished. There is no
//! timeout: a hung dispatch blocks the calling thread indefinitely.

use crate::backend::{
    BufferInit, ComputeBackend, DispatchTiming, ElemType, HostSlice, HostSliceMut, KernelArg,
    MemAccess, NdRange,
};
use crate::config::{Config, KernelSpec};
use crate::device::{select_device, ComputeDevice};
use crate::error::Result;
use crate::kernel::{load_source, CompiledKernel, KernelCache, KernelKey, Lookup};
use crate::matrix::MatrixLike;
use crate::pipeline;
use crate::telemetry::Metrics;
use crate::timeseries::TimeSeriesLike;
use parking_lot::Mutex;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Device, context and command queue of an initialized session.
pub struct ComputeContext<B: ComputeBackend> {
    device: ComputeDevice<B::Device>,
    context: B::Context,
    queue: B::Queue,
    profiling: bool,
}

impl<B: ComputeBackend> ComputeContext<B> {
    pub fn device(&self) -> &ComputeDevice<B::Device> {
        &self.device
    }

    pub fn raw_context(&self) -> &B::Context {
        &self.context
    }

    pub fn queue(&self) -> &B::Queue {
        &self.queue
    }

    /// Whether the queue records kernel execution time.
    pub fn profiling(&self) -> bool {
        self.profiling
    }
}

impl<B: ComputeBackend> fmt::Debug for ComputeContext<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeContext")
            .field("device", &self.device)
            .field("profiling", &self.profiling)
            .finish()
    }
}

/// Shared handle to the session's command queue.
///
/// Keeps the owning context alive for as long as the handle exists.
pub struct QueueHandle<B: ComputeBackend> {
    context: Arc<ComputeContext<B>>,
}

impl<B: ComputeBackend> QueueHandle<B> {
    pub fn context(&self) -> &Arc<ComputeContext<B>> {
        &self.context
    }

    /// True when both handles refer to the same queue.
    pub fn same_queue(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.context, &other.context)
    }
}

impl<B: ComputeBackend> Clone for QueueHandle<B> {
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
        }
    }
}

impl<B: ComputeBackend> fmt::Debug for QueueHandle<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueHandle")
            .field("device", &self.context.device.name())
            .finish()
    }
}

impl<B: ComputeBackend> Deref for QueueHandle<B> {
    type Target = B::Queue;

    fn deref(&self) -> &B::Queue {
        &self.context.queue
    }
}

/// Device memory scoped to one pipeline call.
///
/// The allocation is released when the guard drops, on every exit path.
pub struct DeviceBuffer<'s, B: ComputeBackend> {
    buffer: B::Buffer,
    label: &'static str,
    elem: ElemType,
    len: usize,
    live: &'s AtomicUsize,
    metrics: &'s Metrics,
}

impl<'s, B: ComputeBackend> DeviceBuffer<'s, B> {
    pub fn raw(&self) -> &B::Buffer {
        &self.buffer
    }

    /// This buffer as a kernel argument.
    pub fn arg(&self) -> KernelArg<'_, B::Buffer> {
        KernelArg::Buffer(&self.buffer)
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn elem(&self) -> ElemType {
        self.elem
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<B: ComputeBackend> fmt::Debug for DeviceBuffer<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("label", &self.label)
            .field("elem", &self.elem)
            .field("len", &self.len)
            .finish()
    }
}

impl<B: ComputeBackend> Drop for DeviceBuffer<'_, B> {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
        self.metrics.record_buffer_released();
        tracing::trace!(buffer = self.label, len = self.len, "device buffer released");
    }
}

/// Entry point for offloading work onto a compute device.
pub struct ComputeSession<B: ComputeBackend> {
    backend: B,
    config: Config,
    state: Mutex<Option<Arc<ComputeContext<B>>>>,
    kernels: KernelCache<B>,
    live_buffers: AtomicUsize,
    metrics: Metrics,
}

impl<B: ComputeBackend> ComputeSession<B> {
    /// Create an uninitialized session. No device work happens here.
    pub fn new(backend: B, config: Config) -> Self {
        Self {
            backend,
            config,
            state: Mutex::new(None),
            kernels: KernelCache::new(),
            live_buffers: AtomicUsize::new(0),
            metrics: Metrics::new(),
        }
    }

    pub fn with_default_config(backend: B) -> Self {
        Self::new(backend, Config::default())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn kernel_cache(&self) -> &KernelCache<B> {
        &self.kernels
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Device buffers currently held by in-flight calls.
    pub fn live_buffers(&self) -> usize {
        self.live_buffers.load(Ordering::Acquire)
    }

    /// The session's context, initializing it on first use.
    pub fn get_context(&self) -> Result<Arc<ComputeContext<B>>> {
        let mut state = self.state.lock();
        if let Some(context) = state.as_ref() {
            return Ok(Arc::clone(context));
        }

        match self.initialize() {
            Ok(context) => {
                let context = Arc::new(context);
                *state = Some(Arc::clone(&context));
                self.metrics.record_initialization();
                Ok(context)
            }
            Err(e) => {
                self.metrics.record_init_failure();
                tracing::warn!(backend = self.backend.name(), error = %e, "compute session initialization failed");
                Err(e)
            }
        }
    }

    /// The session's command queue, initializing the session on first use.
    pub fn get_command_queue(&self) -> Result<QueueHandle<B>> {
        Ok(QueueHandle {
            context: self.get_context()?,
        })
    }

    fn initialize(&self) -> Result<ComputeContext<B>> {
        let probe = self.backend.probe_platform()?;
        let device = select_device(probe, &self.config)?;
        let context = self.backend.create_context(device.handle())?;
        let queue = self
            .backend
            .create_queue(&context, device.handle(), self.config.profiling)?;

        tracing::info!(
            backend = self.backend.name(),
            platform = device.platform_name(),
            device = device.name(),
            kind = %device.kind(),
            fp64 = device.capabilities().fp64,
            "compute session initialized"
        );

        Ok(ComputeContext {
            device,
            context,
            queue,
            profiling: self.config.profiling,
        })
    }

    /// The compiled kernel for `spec`, building it on first use.
    ///
    /// `spec.file` is resolved against the configured kernel directory.
    pub fn get_kernel(&self, spec: &KernelSpec) -> Result<Arc<CompiledKernel<B>>> {
        let context = self.get_context()?;
        let path = spec.resolve(&self.config.kernel_dir);
        let key = KernelKey::new(path, spec.entry_point.clone());

        let result = self.kernels.get_or_build(&key, || {
            let source = load_source(&key.source)?;
            let source_id = key.source.display().to_string();
            tracing::debug!(kernel = %key, bytes = source.len(), "compiling kernel");
            self.backend.build_kernel(
                context.raw_context(),
                context.device().handle(),
                &source_id,
                &source,
                &key.entry_point,
            )
        });

        match result {
            Ok((kernel, Lookup::Hit)) => {
                self.metrics.record_cache_hit();
                tracing::trace!(kernel = %key, "kernel cache hit");
                Ok(kernel)
            }
            Ok((kernel, Lookup::Compiled)) => {
                self.metrics.record_kernel_compiled();
                tracing::debug!(kernel = %key, cached = self.kernels.len(), "kernel compiled");
                Ok(kernel)
            }
            Err(e) => {
                self.metrics.record_compile_failure();
                tracing::warn!(kernel = %key, error = %e, "kernel build failed");
                Err(e)
            }
        }
    }

    /// Allocate a device buffer for the duration of one call.
    pub fn alloc_buffer(
        &self,
        context: &ComputeContext<B>,
        label: &'static str,
        access: MemAccess,
        init: BufferInit<'_>,
    ) -> Result<DeviceBuffer<'_, B>> {
        let elem = init.elem();
        let len = init.len();
        let buffer = self
            .backend
            .create_buffer(&context.context, label, access, init)?;

        self.live_buffers.fetch_add(1, Ordering::AcqRel);
        self.metrics.record_buffer_allocated();
        if let BufferInit::CopyFrom(data) = init {
            self.metrics.record_upload(data.byte_len());
        }
        tracing::trace!(buffer = label, len, elem = ?elem, "device buffer allocated");

        Ok(DeviceBuffer {
            buffer,
            label,
            elem,
            len,
            live: &self.live_buffers,
            metrics: &self.metrics,
        })
    }

    /// Blocking host-to-device copy.
    pub fn write_buffer(&self, context: &ComputeContext<B>, buffer: &DeviceBuffer<'_, B>, data: HostSlice<'_>) -> Result<()> {
        self.backend
            .write_buffer(&context.queue, buffer.label, &buffer.buffer, data)?;
        self.metrics.record_upload(data.byte_len());
        Ok(())
    }

    /// Blocking device-to-host copy.
    pub fn read_buffer(&self, context: &ComputeContext<B>, buffer: &DeviceBuffer<'_, B>, out: HostSliceMut<'_>) -> Result<()> {
        let bytes = out.byte_len();
        self.backend
            .read_buffer(&context.queue, buffer.label, &buffer.buffer, out)?;
        self.metrics.record_download(bytes);
        Ok(())
    }

    /// Bind `args`, enqueue `kernel` over `range`, then flush and wait.
    ///
    /// Blocks until the device reports completion.
    pub fn dispatch(
        &self,
        context: &ComputeContext<B>,
        kernel: &CompiledKernel<B>,
        args: &[KernelArg<'_, B::Buffer>],
        range: &NdRange,
    ) -> Result<DispatchTiming> {
        tracing::debug!(
            kernel = kernel.entry_point(),
            dims = range.dims,
            global = ?&range.global[..range.dims as usize],
            local = ?range.local.map(|l| l[..range.dims as usize].to_vec()),
            "dispatching kernel"
        );

        let started = Instant::now();
        let event = {
            let _guard = kernel.lock_dispatch();
            self.backend
                .enqueue_kernel(&context.queue, kernel.raw(), args, range)
        };
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                self.metrics.record_dispatch_failure();
                return Err(e);
            }
        };

        self.backend.flush(&context.queue)?;
        self.backend.finish(&context.queue)?;

        let timing = self.backend.timing(&event);
        match timing.kernel_time {
            Some(elapsed) => self.metrics.record_dispatch(elapsed, true),
            None => self.metrics.record_dispatch(started.elapsed(), false),
        }
        Ok(timing)
    }

    /// Multiply two matrices on the device. See [`pipeline::matmul::multiply`].
    pub fn multiply<M: MatrixLike>(&self, a: &M, b: &M) -> Result<M> {
        pipeline::matmul::multiply(self, a, b)
    }

    /// Check for constant timestamp spacing on the device.
    /// See [`pipeline::normalization::is_uniformly_spaced`].
    pub fn is_uniformly_spaced(&self, timestamps: &[f64]) -> Result<bool> {
        pipeline::normalization::is_uniformly_spaced(self, timestamps)
    }

    /// See [`pipeline::normalization::check_normalization`].
    pub fn check_normalization<T: TimeSeriesLike + ?Sized>(&self, series: &T) -> Result<bool> {
        pipeline::normalization::check_normalization(self, series)
    }
}

impl<B: ComputeBackend> fmt::Debug for ComputeSession<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeSession")
            .field("backend", &self.backend.name())
            .field("initialized", &self.is_initialized())
            .field("kernels", &self.kernels.len())
            .field("live_buffers", &self.live_buffers())
            .finish()
    }
}

impl<B: ComputeBackend> Drop for ComputeSession<B> {
    fn drop(&mut self) {
        if self.state.get_mut().is_some() {
            tracing::debug!(backend = self.backend.name(), "releasing compute session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::host::{Fault, HostBackend};
    use crate::config::DevicePreference;
    use crate::device::DeviceKind;
    use crate::error::Error;

    fn session(backend: HostBackend) -> ComputeSession<HostBackend> {
        let config = Config::builder()
            .kernel_dir(concat!(env!("CARGO_MANIFEST_DIR"), "/kernels"))
            .build()
            .unwrap();
        ComputeSession::new(backend, config)
    }

    #[test]
    fn test_session_is_lazy() {
        let backend = HostBackend::new();
        let session = session(backend.clone());
        assert!(!session.is_initialized());
        assert_eq!(backend.stats().probes, 0);
    }

    #[test]
    fn test_context_and_queue_are_cached() {
        let backend = HostBackend::new();
        let session = session(backend.clone());

        let first = session.get_context().unwrap();
        let second = session.get_context().unwrap();
        let q1 = session.get_command_queue().unwrap();
        let q2 = session.get_command_queue().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(q1.same_queue(&q2));
        assert_eq!(backend.stats().probes, 1);
        assert_eq!(backend.stats().contexts_created, 1);
        assert_eq!(backend.stats().queues_created, 1);
        assert_eq!(first.device().kind(), DeviceKind::Cpu);
    }

    #[test]
    fn test_failed_initialization_is_retried() {
        let backend = HostBackend::new();
        backend.fail_next(Fault::Queue, 1);
        let session = session(backend.clone());

        let err = session.get_context().unwrap_err();
        assert!(matches!(err, Error::Queue(_)));
        assert!(!session.is_initialized());

        session.get_context().unwrap();
        assert!(session.is_initialized());
        assert_eq!(backend.stats().probes, 2);
    }

    #[cfg(feature = "telemetry")]
    #[test]
    fn test_failed_initialization_is_counted() {
        let backend = HostBackend::new();
        backend.fail_next(Fault::Context, 1);
        let session = session(backend);

        assert!(session.get_context().is_err());
        session.get_context().unwrap();

        let snapshot = session.metrics().snapshot();
        assert_eq!(snapshot.init_failures, 1);
        assert_eq!(snapshot.initializations, 1);
    }

    #[test]
    fn test_forced_gpu_without_gpu_fails() {
        let config = Config::builder()
            .device_preference(DevicePreference::Gpu)
            .build()
            .unwrap();
        let session = ComputeSession::new(HostBackend::new(), config);
        assert!(matches!(session.get_context(), Err(Error::NoDevice(_))));
    }

    #[test]
    fn test_device_buffer_guard_releases() {
        let session = session(HostBackend::new());
        let context = session.get_context().unwrap();
        {
            let data = [1.0f64, 2.0];
            let _buffer = session
                .alloc_buffer(&context, "ts", MemAccess::ReadOnly, BufferInit::CopyFrom(HostSlice::F64(&data)))
                .unwrap();
            assert_eq!(session.live_buffers(), 1);
        }
        assert_eq!(session.live_buffers(), 0);
    }

    #[test]
    fn test_kernel_is_compiled_once() {
        let backend = HostBackend::new();
        let session = session(backend.clone());
        let spec = KernelSpec::matrix_multiplication();

        let a = session.get_kernel(&spec).unwrap();
        let b = session.get_kernel(&spec).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(backend.stats().builds, 1);
        assert_eq!(session.kernel_cache().len(), 1);
    }
}
