//! Running blocking offload calls from async code.
//!
//! Device calls block until the device finishes. [`offload`] moves such a
//! call onto a dedicated named thread and hands back a handle that can be
//! awaited, so async callers can impose their own timeouts.

pub mod offload;

pub use offload::{block_on, is_uniformly_spaced_async, multiply_async, offload, OffloadHandle};
