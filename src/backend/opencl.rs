//! OpenCL backend built on the `ocl` crate.
//!
//! Programs are compiled once per kernel key and shared. Each dispatch
//! creates its own kernel object from the shared program, so argument
//! binding never races between threads using the same cached kernel.

use super::{
    BufferInit, ComputeBackend, DispatchTiming, ElemType, HostSlice, HostSliceMut, KernelArg,
    MemAccess, NdRange,
};
use crate::device::{DeviceCandidate, PlatformProbe};
use crate::error::{Error, Result};
use ocl::core::{self, ArgVal};
use ocl::enums::{DeviceInfo, ProfilingInfo, ProfilingInfoResult};
use ocl::flags::{CommandQueueProperties, DeviceType, MemFlags};
use ocl::{Buffer, Context, Device, Platform, Program, Queue};
use std::time::Duration;

/// A device together with the platform it was found on.
#[derive(Debug, Clone, Copy)]
pub struct OclDevice {
    platform: Platform,
    device: Device,
}

impl OclDevice {
    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn device(&self) -> Device {
        self.device
    }
}

/// A built program and the entry point extracted from it.
#[derive(Debug)]
pub struct OclKernel {
    program: Program,
    entry_point: String,
}

impl OclKernel {
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }
}

/// Typed device memory.
#[derive(Debug)]
pub enum OclBuffer {
    F32(Buffer<f32>),
    F64(Buffer<f64>),
    I32(Buffer<i32>),
}

impl OclBuffer {
    fn as_core(&self) -> &core::Mem {
        match self {
            OclBuffer::F32(b) => b.as_core(),
            OclBuffer::F64(b) => b.as_core(),
            OclBuffer::I32(b) => b.as_core(),
        }
    }

    fn elem(&self) -> ElemType {
        match self {
            OclBuffer::F32(_) => ElemType::F32,
            OclBuffer::F64(_) => ElemType::F64,
            OclBuffer::I32(_) => ElemType::I32,
        }
    }
}

/// The system OpenCL runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct OclBackend;

impl OclBackend {
    pub fn new() -> Self {
        Self
    }

    /// True when at least one OpenCL platform is installed.
    ///
    /// A missing ICD loader or an empty platform list both report `false`.
    pub fn is_available() -> bool {
        first_platform().is_ok()
    }
}

/// The first installed platform.
///
/// `clGetPlatformIDs` fails with `CL_PLATFORM_NOT_FOUND_KHR` when an ICD
/// loader is present without any vendor platform; that surfaces as
/// [`Error::Platform`].
fn first_platform() -> Result<Platform> {
    let ids = core::get_platform_ids().map_err(|e| Error::platform(e.to_string()))?;
    ids.into_iter()
        .next()
        .map(Platform::new)
        .ok_or_else(|| Error::platform("no OpenCL platform installed"))
}

fn first_device(platform: Platform, kind: DeviceType) -> Option<DeviceCandidate<OclDevice>> {
    let devices = match Device::list(platform, Some(kind)) {
        Ok(devices) => devices,
        Err(e) => {
            tracing::debug!(kind = ?kind, error = %e, "device enumeration failed");
            return None;
        }
    };
    let device = devices.into_iter().next()?;
    let name = device.name().unwrap_or_else(|_| "unknown device".to_string());
    let extensions = device
        .info(DeviceInfo::Extensions)
        .map(|info| info.to_string())
        .unwrap_or_default();
    Some(DeviceCandidate::new(OclDevice { platform, device }, name, extensions))
}

fn mem_flags(access: MemAccess) -> MemFlags {
    match access {
        MemAccess::ReadOnly => MemFlags::new().read_only(),
        MemAccess::WriteOnly => MemFlags::new().write_only(),
        MemAccess::ReadWrite => MemFlags::new().read_write(),
    }
}

fn typed_buffer<T: ocl::OclPrm>(
    context: &Context,
    flags: MemFlags,
    len: usize,
    data: Option<&[T]>,
) -> ocl::Result<Buffer<T>> {
    let builder = Buffer::<T>::builder().context(context).flags(flags).len(len);
    match data {
        Some(data) => builder.copy_host_slice(data).build(),
        None => builder.build(),
    }
}

impl ComputeBackend for OclBackend {
    type Device = OclDevice;
    type Context = Context;
    type Queue = Queue;
    type Kernel = OclKernel;
    type Buffer = OclBuffer;
    type Event = core::Event;

    fn name(&self) -> &'static str {
        "opencl"
    }

    fn probe_platform(&self) -> Result<PlatformProbe<OclDevice>> {
        let platform = first_platform()?;
        let platform_name = platform.name().map_err(|e| Error::platform(e.to_string()))?;

        Ok(PlatformProbe {
            cpu: first_device(platform, DeviceType::CPU),
            gpu: first_device(platform, DeviceType::GPU),
            platform_name,
        })
    }

    fn create_context(&self, device: &OclDevice) -> Result<Context> {
        Context::builder()
            .platform(device.platform)
            .devices(device.device)
            .build()
            .map_err(|e| Error::context(e.to_string()))
    }

    fn create_queue(&self, context: &Context, device: &OclDevice, profiling: bool) -> Result<Queue> {
        let properties = profiling.then(|| CommandQueueProperties::PROFILING_ENABLE);
        Queue::new(context, device.device, properties).map_err(|e| Error::queue(e.to_string()))
    }

    fn build_kernel(
        &self,
        context: &Context,
        device: &OclDevice,
        source_id: &str,
        source: &str,
        entry_point: &str,
    ) -> Result<OclKernel> {
        // The build error carries the device compiler's log.
        let program = Program::builder()
            .src(source)
            .devices(device.device)
            .build(context)
            .map_err(|e| Error::compile(source_id, e.to_string()))?;

        core::create_kernel(program.as_core(), entry_point).map_err(|e| Error::EntryPointNotFound {
            source_id: source_id.to_string(),
            entry_point: entry_point.to_string(),
            message: e.to_string(),
        })?;

        Ok(OclKernel {
            program,
            entry_point: entry_point.to_string(),
        })
    }

    fn create_buffer(
        &self,
        context: &Context,
        label: &str,
        access: MemAccess,
        init: BufferInit<'_>,
    ) -> Result<OclBuffer> {
        if init.is_empty() {
            return Err(Error::allocation(label, "zero-sized buffer"));
        }
        let flags = mem_flags(access);
        let len = init.len();

        let buffer = match init {
            BufferInit::CopyFrom(HostSlice::F32(d)) => typed_buffer(context, flags, len, Some(d)).map(OclBuffer::F32),
            BufferInit::CopyFrom(HostSlice::F64(d)) => typed_buffer(context, flags, len, Some(d)).map(OclBuffer::F64),
            BufferInit::CopyFrom(HostSlice::I32(d)) => typed_buffer(context, flags, len, Some(d)).map(OclBuffer::I32),
            BufferInit::Uninit { elem: ElemType::F32, .. } => {
                typed_buffer::<f32>(context, flags, len, None).map(OclBuffer::F32)
            }
            BufferInit::Uninit { elem: ElemType::F64, .. } => {
                typed_buffer::<f64>(context, flags, len, None).map(OclBuffer::F64)
            }
            BufferInit::Uninit { elem: ElemType::I32, .. } => {
                typed_buffer::<i32>(context, flags, len, None).map(OclBuffer::I32)
            }
        };
        buffer.map_err(|e| Error::allocation(label, e.to_string()))
    }

    fn write_buffer(&self, queue: &Queue, label: &str, buffer: &OclBuffer, data: HostSlice<'_>) -> Result<()> {
        let result = match (buffer, data) {
            (OclBuffer::F32(b), HostSlice::F32(d)) => b.write(d).queue(queue).enq(),
            (OclBuffer::F64(b), HostSlice::F64(d)) => b.write(d).queue(queue).enq(),
            (OclBuffer::I32(b), HostSlice::I32(d)) => b.write(d).queue(queue).enq(),
            (buffer, data) => {
                return Err(Error::transfer(
                    label,
                    format!("cannot write {:?} data into a {:?} buffer", data.elem(), buffer.elem()),
                ))
            }
        };
        result.map_err(|e| Error::transfer(label, e.to_string()))
    }

    fn read_buffer(&self, queue: &Queue, label: &str, buffer: &OclBuffer, out: HostSliceMut<'_>) -> Result<()> {
        let result = match (buffer, out) {
            (OclBuffer::F32(b), HostSliceMut::F32(d)) => b.read(d).queue(queue).enq(),
            (OclBuffer::F64(b), HostSliceMut::F64(d)) => b.read(d).queue(queue).enq(),
            (OclBuffer::I32(b), HostSliceMut::I32(d)) => b.read(d).queue(queue).enq(),
            (buffer, out) => {
                return Err(Error::transfer(
                    label,
                    format!("cannot read a {:?} buffer into {:?} memory", buffer.elem(), out.elem()),
                ))
            }
        };
        result.map_err(|e| Error::transfer(label, e.to_string()))
    }

    fn enqueue_kernel(
        &self,
        queue: &Queue,
        kernel: &OclKernel,
        args: &[KernelArg<'_, OclBuffer>],
        range: &NdRange,
    ) -> Result<core::Event> {
        let name = kernel.entry_point.as_str();
        let instance = core::create_kernel(kernel.program.as_core(), name)
            .map_err(|e| Error::dispatch(name, e.to_string()))?;

        for (index, arg) in args.iter().enumerate() {
            let bound = match arg {
                KernelArg::Buffer(buffer) => core::set_kernel_arg(&instance, index as u32, ArgVal::mem(buffer.as_core())),
                KernelArg::Int(v) => core::set_kernel_arg(&instance, index as u32, ArgVal::scalar(v)),
                KernelArg::Float(v) => core::set_kernel_arg(&instance, index as u32, ArgVal::scalar(v)),
                KernelArg::Double(v) => core::set_kernel_arg(&instance, index as u32, ArgVal::scalar(v)),
            };
            bound.map_err(|e| Error::kernel_argument(name, index, e.to_string()))?;
        }

        let mut event = core::Event::null();
        // Arguments were bound above and every buffer outlives the finish
        // the session performs before releasing them.
        unsafe {
            core::enqueue_kernel(
                queue.as_core(),
                &instance,
                range.dims,
                None,
                &range.global,
                range.local,
                None::<core::Event>,
                Some(&mut event),
            )
        }
        .map_err(|e| Error::dispatch(name, e.to_string()))?;

        Ok(event)
    }

    fn flush(&self, queue: &Queue) -> Result<()> {
        queue.flush().map_err(|e| Error::synchronization(e.to_string()))
    }

    fn finish(&self, queue: &Queue) -> Result<()> {
        queue.finish().map_err(|e| Error::synchronization(e.to_string()))
    }

    fn timing(&self, event: &core::Event) -> DispatchTiming {
        let start = core::get_event_profiling_info(event, ProfilingInfo::Start);
        let end = core::get_event_profiling_info(event, ProfilingInfo::End);
        let kernel_time = match (start, end) {
            (Ok(ProfilingInfoResult::Start(start)), Ok(ProfilingInfoResult::End(end))) if end >= start => {
                Some(Duration::from_nanos(end - start))
            }
            _ => None,
        };
        DispatchTiming { kernel_time }
    }
}
