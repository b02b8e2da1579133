//! The two kernel-invocation pipelines.
//!
//! Each call acquires the session's context and cached kernel, stages its
//! inputs in device buffers that live only for the call, dispatches,
//! waits for the device, and reads the result back.

pub mod matmul;
pub mod normalization;

pub use matmul::multiply;
pub use normalization::{check_normalization, is_uniformly_spaced};
