//! In-process reference device.
//!
//! `HostBackend` behaves like a single-platform OpenCL runtime whose
//! devices execute on the calling thread. It understands the two kernels
//! this crate dispatches and runs them natively, work-group by work-group,
//! with the same argument contract and index-space rules as the device
//! sources in `kernels/`. Program builds are simulated closely enough to
//! produce build logs (`#error` directives, unbalanced braces) and
//! missing-entry-point failures.
//!
//! Every allocation is counted, and faults can be injected at each stage,
//! which makes it the backend of choice for tests and for machines
//! without an OpenCL driver.

use super::{
    BufferInit, ComputeBackend, DispatchTiming, ElemType, HostSlice, HostSliceMut, KernelArg,
    MemAccess, NdRange,
};
use crate::device::{DeviceCandidate, DeviceKind, PlatformProbe};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Extension string reported by the default reference CPU.
pub const DEFAULT_CPU_EXTENSIONS: &str = "cl_khr_fp64 cl_khr_global_int32_base_atomics";

/// A stage at which the reference device can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    Platform,
    Context,
    Queue,
    Allocation,
    Write,
    Read,
    Dispatch,
    Finish,
}

/// Device handle of the reference backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostDevice {
    kind: DeviceKind,
    name: String,
}

impl HostDevice {
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug)]
pub struct HostContext {
    device: HostDevice,
}

impl HostContext {
    pub fn device(&self) -> &HostDevice {
        &self.device
    }
}

#[derive(Debug)]
pub struct HostQueue {
    profiling: bool,
    enqueued: AtomicU64,
}

impl HostQueue {
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NativeKernel {
    MatrixMultiplication,
    CheckNormalization,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgKind {
    Buffer(ElemType),
    Int,
    Double,
}

impl ArgKind {
    fn describe(self) -> &'static str {
        match self {
            ArgKind::Buffer(ElemType::F32) => "__global float*",
            ArgKind::Buffer(ElemType::F64) => "__global double*",
            ArgKind::Buffer(ElemType::I32) => "__global int*",
            ArgKind::Int => "int",
            ArgKind::Double => "double",
        }
    }
}

impl NativeKernel {
    fn from_entry_point(entry_point: &str) -> Option<Self> {
        match entry_point {
            "matrix_multiplication" => Some(Self::MatrixMultiplication),
            "_check_normalization" => Some(Self::CheckNormalization),
            _ => None,
        }
    }

    fn signature(self) -> &'static [ArgKind] {
        match self {
            Self::MatrixMultiplication => &[
                ArgKind::Buffer(ElemType::F32),
                ArgKind::Buffer(ElemType::F32),
                ArgKind::Buffer(ElemType::F32),
                ArgKind::Int,
                ArgKind::Int,
            ],
            Self::CheckNormalization => &[
                ArgKind::Double,
                ArgKind::Buffer(ElemType::F64),
                ArgKind::Buffer(ElemType::I32),
            ],
        }
    }

    fn dims(self) -> u32 {
        match self {
            Self::MatrixMultiplication => 2,
            Self::CheckNormalization => 1,
        }
    }

    fn requires_fp64(self) -> bool {
        matches!(self, Self::CheckNormalization)
    }
}

/// A kernel built by the reference device.
#[derive(Debug)]
pub struct HostKernel {
    entry_point: String,
    native: NativeKernel,
}

impl HostKernel {
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }
}

#[derive(Debug)]
enum HostData {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
}

impl HostData {
    fn zeroed(elem: ElemType, len: usize) -> Self {
        match elem {
            ElemType::F32 => HostData::F32(vec![0.0; len]),
            ElemType::F64 => HostData::F64(vec![0.0; len]),
            ElemType::I32 => HostData::I32(vec![0; len]),
        }
    }

    fn from_slice(data: HostSlice<'_>) -> Self {
        match data {
            HostSlice::F32(d) => HostData::F32(d.to_vec()),
            HostSlice::F64(d) => HostData::F64(d.to_vec()),
            HostSlice::I32(d) => HostData::I32(d.to_vec()),
        }
    }
}

/// Device memory of the reference backend.
#[derive(Debug)]
pub struct HostBuffer {
    data: Mutex<HostData>,
    elem: ElemType,
    len: usize,
    access: MemAccess,
    live: Arc<AtomicUsize>,
}

impl HostBuffer {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn elem(&self) -> ElemType {
        self.elem
    }

    pub fn access(&self) -> MemAccess {
        self.access
    }

    fn f32_contents(&self) -> Option<Vec<f32>> {
        match &*self.data.lock() {
            HostData::F32(d) => Some(d.clone()),
            _ => None,
        }
    }

    fn f64_contents(&self) -> Option<Vec<f64>> {
        match &*self.data.lock() {
            HostData::F64(d) => Some(d.clone()),
            _ => None,
        }
    }
}

impl Drop for HostBuffer {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HostEvent {
    elapsed: Option<Duration>,
}

/// Counters describing what the reference device has been asked to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostStats {
    pub probes: u64,
    pub contexts_created: u64,
    pub queues_created: u64,
    pub builds: u64,
    pub buffers_allocated: u64,
    pub live_buffers: usize,
    pub writes: u64,
    pub reads: u64,
    pub dispatches: u64,
    pub flushes: u64,
    pub finishes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    probes: AtomicU64,
    contexts_created: AtomicU64,
    queues_created: AtomicU64,
    builds: AtomicU64,
    buffers_allocated: AtomicU64,
    writes: AtomicU64,
    reads: AtomicU64,
    dispatches: AtomicU64,
    flushes: AtomicU64,
    finishes: AtomicU64,
}

/// Pending failures for one fault kind: let `skip` operations through,
/// then fail the next `remaining`.
#[derive(Debug, Clone, Copy, Default)]
struct FaultPlan {
    skip: u32,
    remaining: u32,
}

#[derive(Debug)]
struct HostState {
    platform_name: String,
    cpu: Option<HostDevice>,
    gpu: Option<(HostDevice, String)>,
    cpu_extensions: String,
    faults: Mutex<HashMap<Fault, FaultPlan>>,
    counters: Counters,
    live: Arc<AtomicUsize>,
}

/// Reference compute backend. Cloning shares the same device state.
#[derive(Debug, Clone)]
pub struct HostBackend {
    state: Arc<HostState>,
}

impl Default for HostBackend {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl HostBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> HostBackendBuilder {
        HostBackendBuilder::new()
    }

    /// Make the next `times` operations of kind `fault` fail.
    pub fn fail_next(&self, fault: Fault, times: u32) {
        self.fail_after(fault, 0, times);
    }

    /// Let the next `skip` operations of kind `fault` succeed, then make
    /// the `times` after them fail.
    ///
    /// `fail_after(Fault::Allocation, 2, 1)` fails the third allocation.
    pub fn fail_after(&self, fault: Fault, skip: u32, times: u32) {
        let mut faults = self.state.faults.lock();
        let plan = faults.entry(fault).or_default();
        plan.skip = skip;
        plan.remaining = plan.remaining.saturating_add(times);
    }

    /// Drop every pending injected fault.
    pub fn clear_faults(&self) {
        self.state.faults.lock().clear();
    }

    /// Number of device allocations currently alive.
    pub fn live_buffers(&self) -> usize {
        self.state.live.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> HostStats {
        let c = &self.state.counters;
        HostStats {
            probes: c.probes.load(Ordering::Relaxed),
            contexts_created: c.contexts_created.load(Ordering::Relaxed),
            queues_created: c.queues_created.load(Ordering::Relaxed),
            builds: c.builds.load(Ordering::Relaxed),
            buffers_allocated: c.buffers_allocated.load(Ordering::Relaxed),
            live_buffers: self.live_buffers(),
            writes: c.writes.load(Ordering::Relaxed),
            reads: c.reads.load(Ordering::Relaxed),
            dispatches: c.dispatches.load(Ordering::Relaxed),
            flushes: c.flushes.load(Ordering::Relaxed),
            finishes: c.finishes.load(Ordering::Relaxed),
        }
    }

    fn take_fault(&self, fault: Fault) -> bool {
        let mut faults = self.state.faults.lock();
        match faults.get_mut(&fault) {
            Some(plan) if plan.remaining > 0 => {
                if plan.skip > 0 {
                    plan.skip -= 1;
                    return false;
                }
                plan.remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn execute(
        &self,
        kernel: &HostKernel,
        args: &[KernelArg<'_, HostBuffer>],
        range: &NdRange,
    ) -> Result<()> {
        let name = kernel.entry_point.as_str();
        match kernel.native {
            NativeKernel::MatrixMultiplication => {
                let (a, b, c, k, n) = match args {
                    [KernelArg::Buffer(a), KernelArg::Buffer(b), KernelArg::Buffer(c), KernelArg::Int(k), KernelArg::Int(n)] => {
                        (*a, *b, *c, *k, *n)
                    }
                    _ => return Err(Error::dispatch(name, "CL_INVALID_KERNEL_ARGS")),
                };
                let lhs = a.f32_contents().ok_or_else(|| Error::dispatch(name, "lhs is not a float buffer"))?;
                let rhs = b.f32_contents().ok_or_else(|| Error::dispatch(name, "rhs is not a float buffer"))?;
                let (k, n) = (k.max(0) as usize, n.max(0) as usize);
                let local = range.local.unwrap_or([1, 1, 1]);

                let mut out = c.data.lock();
                let out = match &mut *out {
                    HostData::F32(d) => d,
                    _ => return Err(Error::dispatch(name, "output is not a float buffer")),
                };

                // Work-groups in order, work items in order within a group.
                for group_row in (0..range.global[0]).step_by(local[0]) {
                    for group_col in (0..range.global[1]).step_by(local[1]) {
                        for row in group_row..group_row + local[0] {
                            for col in group_col..group_col + local[1] {
                                let mut value = 0.0f32;
                                for i in 0..k {
                                    let x = lhs.get(row * k + i);
                                    let y = rhs.get(i * n + col);
                                    match (x, y) {
                                        (Some(x), Some(y)) => value += x * y,
                                        _ => return Err(out_of_bounds(name, row, col)),
                                    }
                                }
                                let slot = out
                                    .get_mut(row * n + col)
                                    .ok_or_else(|| out_of_bounds(name, row, col))?;
                                *slot = value;
                            }
                        }
                    }
                }
                Ok(())
            }
            NativeKernel::CheckNormalization => {
                let (distance, timestamps, flag) = match args {
                    [KernelArg::Double(d), KernelArg::Buffer(ts), KernelArg::Buffer(flag)] => (*d, *ts, *flag),
                    _ => return Err(Error::dispatch(name, "CL_INVALID_KERNEL_ARGS")),
                };
                let timestamps = timestamps
                    .f64_contents()
                    .ok_or_else(|| Error::dispatch(name, "timestamps are not a double buffer"))?;

                let mut flag = flag.data.lock();
                let flag = match &mut *flag {
                    HostData::I32(d) if !d.is_empty() => d,
                    _ => return Err(Error::dispatch(name, "flag is not an int buffer")),
                };

                for i in 0..range.global[0] {
                    let (current, next) = match (timestamps.get(i), timestamps.get(i + 1)) {
                        (Some(c), Some(n)) => (*c, *n),
                        _ => return Err(out_of_bounds(name, i, 0)),
                    };
                    if next - current != distance {
                        flag[0] = 1;
                    }
                }
                Ok(())
            }
        }
    }
}

fn out_of_bounds(kernel: &str, x: usize, y: usize) -> Error {
    Error::dispatch(
        kernel,
        format!("out-of-bounds global memory access by work item ({}, {})", x, y),
    )
}

/// Describes the reference platform.
#[derive(Debug)]
pub struct HostBackendBuilder {
    platform_name: String,
    platform_available: bool,
    cpu: Option<(String, String)>,
    gpu: Option<(String, String)>,
}

impl HostBackendBuilder {
    pub fn new() -> Self {
        Self {
            platform_name: "offload reference platform".to_string(),
            platform_available: true,
            cpu: Some(("reference CPU".to_string(), DEFAULT_CPU_EXTENSIONS.to_string())),
            gpu: None,
        }
    }

    pub fn platform_name<S: Into<String>>(mut self, name: S) -> Self {
        self.platform_name = name.into();
        self
    }

    /// Simulate a machine without any platform.
    pub fn no_platform(mut self) -> Self {
        self.platform_available = false;
        self
    }

    pub fn cpu<N: Into<String>, E: Into<String>>(mut self, name: N, extensions: E) -> Self {
        self.cpu = Some((name.into(), extensions.into()));
        self
    }

    pub fn without_cpu(mut self) -> Self {
        self.cpu = None;
        self
    }

    pub fn gpu<N: Into<String>, E: Into<String>>(mut self, name: N, extensions: E) -> Self {
        self.gpu = Some((name.into(), extensions.into()));
        self
    }

    pub fn build(self) -> HostBackend {
        let mut faults = HashMap::new();
        if !self.platform_available {
            faults.insert(
                Fault::Platform,
                FaultPlan {
                    skip: 0,
                    remaining: u32::MAX,
                },
            );
        }

        let (cpu, cpu_extensions) = match self.cpu {
            Some((name, ext)) => (
                Some(HostDevice {
                    kind: DeviceKind::Cpu,
                    name,
                }),
                ext,
            ),
            None => (None, String::new()),
        };
        let gpu = self.gpu.map(|(name, ext)| {
            (
                HostDevice {
                    kind: DeviceKind::Gpu,
                    name,
                },
                ext,
            )
        });

        HostBackend {
            state: Arc::new(HostState {
                platform_name: self.platform_name,
                cpu,
                gpu,
                cpu_extensions,
                faults: Mutex::new(faults),
                counters: Counters::default(),
                live: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }
}

impl Default for HostBackendBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of the simulated front end.
struct ParsedProgram {
    kernels: Vec<String>,
}

/// Parse just enough OpenCL C to find kernels and report obvious errors.
fn parse_program(source_id: &str, source: &str) -> std::result::Result<ParsedProgram, String> {
    let mut diagnostics = Vec::new();
    for (line_no, line) in source.lines().enumerate() {
        if let Some(col) = line.find("#error") {
            let message = line[col + "#error".len()..].trim();
            diagnostics.push(format!(
                "{}:{}:{}: error: {}",
                source_id,
                line_no + 1,
                col + 1,
                message
            ));
        }
    }

    let opened = source.matches('{').count();
    let closed = source.matches('}').count();
    if opened != closed {
        let last_line = source.lines().count().max(1);
        diagnostics.push(format!(
            "{}:{}:1: error: expected '}}' (found {} '{{' and {} '}}')",
            source_id, last_line, opened, closed
        ));
    }

    if !diagnostics.is_empty() {
        let count = diagnostics.len();
        diagnostics.push(format!(
            "{} error{} generated.",
            count,
            if count == 1 { "" } else { "s" }
        ));
        return Err(diagnostics.join("\n"));
    }

    let kernels = source
        .split("__kernel")
        .skip(1)
        .filter_map(|fragment| {
            let after_void = fragment.trim_start().strip_prefix("void")?;
            let name = after_void.trim_start().split('(').next()?.trim();
            if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                None
            } else {
                Some(name.to_string())
            }
        })
        .collect();

    Ok(ParsedProgram { kernels })
}

impl ComputeBackend for HostBackend {
    type Device = HostDevice;
    type Context = HostContext;
    type Queue = HostQueue;
    type Kernel = HostKernel;
    type Buffer = HostBuffer;
    type Event = HostEvent;

    fn name(&self) -> &'static str {
        "host"
    }

    fn probe_platform(&self) -> Result<PlatformProbe<HostDevice>> {
        self.state.counters.probes.fetch_add(1, Ordering::Relaxed);
        if self.take_fault(Fault::Platform) {
            return Err(Error::platform("failure in clGetPlatformIDs (-1001)"));
        }

        let cpu = self
            .state
            .cpu
            .clone()
            .map(|dev| {
                let name = dev.name.clone();
                DeviceCandidate::new(dev, name, self.state.cpu_extensions.clone())
            });
        let gpu = self.state.gpu.clone().map(|(dev, ext)| {
            let name = dev.name.clone();
            DeviceCandidate::new(dev, name, ext)
        });

        Ok(PlatformProbe {
            platform_name: self.state.platform_name.clone(),
            cpu,
            gpu,
        })
    }

    fn create_context(&self, device: &HostDevice) -> Result<HostContext> {
        if self.take_fault(Fault::Context) {
            return Err(Error::context("CL_OUT_OF_HOST_MEMORY"));
        }
        self.state.counters.contexts_created.fetch_add(1, Ordering::Relaxed);
        Ok(HostContext {
            device: device.clone(),
        })
    }

    fn create_queue(&self, _context: &HostContext, _device: &HostDevice, profiling: bool) -> Result<HostQueue> {
        if self.take_fault(Fault::Queue) {
            return Err(Error::queue("CL_OUT_OF_RESOURCES"));
        }
        self.state.counters.queues_created.fetch_add(1, Ordering::Relaxed);
        Ok(HostQueue {
            profiling,
            enqueued: AtomicU64::new(0),
        })
    }

    fn build_kernel(
        &self,
        context: &HostContext,
        _device: &HostDevice,
        source_id: &str,
        source: &str,
        entry_point: &str,
    ) -> Result<HostKernel> {
        self.state.counters.builds.fetch_add(1, Ordering::Relaxed);

        if source.trim().is_empty() {
            return Err(Error::ProgramCreate {
                source_id: source_id.to_string(),
                message: "CL_INVALID_VALUE: empty program source".to_string(),
            });
        }

        let program = parse_program(source_id, source).map_err(|log| Error::compile(source_id, log))?;

        if !program.kernels.iter().any(|k| k == entry_point) {
            return Err(Error::EntryPointNotFound {
                source_id: source_id.to_string(),
                entry_point: entry_point.to_string(),
                message: "CL_INVALID_KERNEL_NAME".to_string(),
            });
        }

        let native = NativeKernel::from_entry_point(entry_point).ok_or_else(|| Error::EntryPointNotFound {
            source_id: source_id.to_string(),
            entry_point: entry_point.to_string(),
            message: "the reference device has no native implementation of this kernel".to_string(),
        })?;

        if native.requires_fp64() && context.device.kind == DeviceKind::Gpu {
            let gpu_ext = self.state.gpu.as_ref().map(|(_, ext)| ext.as_str()).unwrap_or("");
            if !gpu_ext.split_whitespace().any(|e| e == "cl_khr_fp64" || e == "cl_amd_fp64") {
                return Err(Error::compile(
                    source_id,
                    format!(
                        "{}:1:1: error: use of type 'double' requires cl_khr_fp64 support\n1 error generated.",
                        source_id
                    ),
                ));
            }
        }

        Ok(HostKernel {
            entry_point: entry_point.to_string(),
            native,
        })
    }

    fn create_buffer(
        &self,
        _context: &HostContext,
        label: &str,
        access: MemAccess,
        init: BufferInit<'_>,
    ) -> Result<HostBuffer> {
        if init.is_empty() {
            return Err(Error::allocation(label, "CL_INVALID_BUFFER_SIZE"));
        }
        if self.take_fault(Fault::Allocation) {
            return Err(Error::allocation(label, "CL_MEM_OBJECT_ALLOCATION_FAILURE"));
        }

        let data = match init {
            BufferInit::CopyFrom(slice) => HostData::from_slice(slice),
            BufferInit::Uninit { elem, len } => HostData::zeroed(elem, len),
        };

        self.state.counters.buffers_allocated.fetch_add(1, Ordering::Relaxed);
        self.state.live.fetch_add(1, Ordering::AcqRel);
        Ok(HostBuffer {
            data: Mutex::new(data),
            elem: init.elem(),
            len: init.len(),
            access,
            live: Arc::clone(&self.state.live),
        })
    }

    fn write_buffer(&self, queue: &HostQueue, label: &str, buffer: &HostBuffer, data: HostSlice<'_>) -> Result<()> {
        if self.take_fault(Fault::Write) {
            return Err(Error::transfer(label, "CL_OUT_OF_RESOURCES"));
        }
        if data.len() > buffer.len {
            return Err(Error::transfer(
                label,
                format!("write of {} elements exceeds buffer of {}", data.len(), buffer.len),
            ));
        }
        queue.enqueued.fetch_add(1, Ordering::Relaxed);
        self.state.counters.writes.fetch_add(1, Ordering::Relaxed);

        let mut contents = buffer.data.lock();
        match (&mut *contents, data) {
            (HostData::F32(dst), HostSlice::F32(src)) => dst[..src.len()].copy_from_slice(src),
            (HostData::F64(dst), HostSlice::F64(src)) => dst[..src.len()].copy_from_slice(src),
            (HostData::I32(dst), HostSlice::I32(src)) => dst[..src.len()].copy_from_slice(src),
            _ => {
                return Err(Error::transfer(
                    label,
                    format!("element type mismatch: buffer holds {:?}", buffer.elem),
                ))
            }
        }
        Ok(())
    }

    fn read_buffer(&self, queue: &HostQueue, label: &str, buffer: &HostBuffer, out: HostSliceMut<'_>) -> Result<()> {
        if self.take_fault(Fault::Read) {
            return Err(Error::transfer(label, "CL_OUT_OF_RESOURCES"));
        }
        if out.len() > buffer.len {
            return Err(Error::transfer(
                label,
                format!("read of {} elements exceeds buffer of {}", out.len(), buffer.len),
            ));
        }
        queue.enqueued.fetch_add(1, Ordering::Relaxed);
        self.state.counters.reads.fetch_add(1, Ordering::Relaxed);

        let contents = buffer.data.lock();
        match (&*contents, out) {
            (HostData::F32(src), HostSliceMut::F32(dst)) => {
                let len = dst.len();
                dst.copy_from_slice(&src[..len]);
            }
            (HostData::F64(src), HostSliceMut::F64(dst)) => {
                let len = dst.len();
                dst.copy_from_slice(&src[..len]);
            }
            (HostData::I32(src), HostSliceMut::I32(dst)) => {
                let len = dst.len();
                dst.copy_from_slice(&src[..len]);
            }
            _ => {
                return Err(Error::transfer(
                    label,
                    format!("element type mismatch: buffer holds {:?}", buffer.elem),
                ))
            }
        }
        Ok(())
    }

    fn enqueue_kernel(
        &self,
        queue: &HostQueue,
        kernel: &HostKernel,
        args: &[KernelArg<'_, HostBuffer>],
        range: &NdRange,
    ) -> Result<HostEvent> {
        let name = kernel.entry_point.as_str();
        let signature = kernel.native.signature();

        for (index, expected) in signature.iter().enumerate() {
            let arg = args.get(index).ok_or_else(|| {
                Error::kernel_argument(
                    name,
                    index,
                    format!("CL_INVALID_KERNEL_ARGS: missing {} argument", expected.describe()),
                )
            })?;
            let matches = match (expected, arg) {
                (ArgKind::Buffer(elem), KernelArg::Buffer(buffer)) => buffer.elem == *elem,
                (ArgKind::Int, KernelArg::Int(_)) => true,
                (ArgKind::Double, KernelArg::Double(_)) => true,
                _ => false,
            };
            if !matches {
                return Err(Error::kernel_argument(
                    name,
                    index,
                    format!("CL_INVALID_ARG_VALUE: expected {}, got {}", expected.describe(), arg.describe()),
                ));
            }
        }
        if args.len() > signature.len() {
            return Err(Error::kernel_argument(
                name,
                signature.len(),
                format!("CL_INVALID_ARG_INDEX: kernel takes {} arguments", signature.len()),
            ));
        }

        if range.dims != kernel.native.dims() {
            return Err(Error::dispatch(
                name,
                format!("CL_INVALID_WORK_DIMENSION: expected {}, got {}", kernel.native.dims(), range.dims),
            ));
        }
        let dims = range.dims as usize;
        if range.global[..dims].iter().any(|&g| g == 0) {
            return Err(Error::dispatch(name, "CL_INVALID_GLOBAL_WORK_SIZE"));
        }
        if let Some(local) = range.local {
            let fits = range.global[..dims]
                .iter()
                .zip(&local[..dims])
                .all(|(g, l)| *l > 0 && g % l == 0);
            if !fits {
                return Err(Error::dispatch(name, "CL_INVALID_WORK_GROUP_SIZE"));
            }
        }

        if self.take_fault(Fault::Dispatch) {
            return Err(Error::dispatch(name, "CL_OUT_OF_RESOURCES"));
        }

        queue.enqueued.fetch_add(1, Ordering::Relaxed);
        self.state.counters.dispatches.fetch_add(1, Ordering::Relaxed);

        let started = Instant::now();
        self.execute(kernel, args, range)?;
        let elapsed = queue.profiling.then(|| started.elapsed());

        Ok(HostEvent { elapsed })
    }

    fn flush(&self, _queue: &HostQueue) -> Result<()> {
        self.state.counters.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn finish(&self, _queue: &HostQueue) -> Result<()> {
        if self.take_fault(Fault::Finish) {
            return Err(Error::synchronization("CL_OUT_OF_RESOURCES in clFinish"));
        }
        self.state.counters.finishes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn timing(&self, event: &HostEvent) -> DispatchTiming {
        DispatchTiming {
            kernel_time: event.elapsed,
        }
    }
}
