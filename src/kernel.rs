//! Compiled-kernel cache.
//!
//! Kernels are compiled at most once per `(source file, entry point)` per
//! session and shared afterwards. Failed builds are never cached, so a
//! fixed source file is picked up by the next lookup.

use crate::backend::ComputeBackend;
use crate::error::{Error, Result};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Identity of a compiled kernel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KernelKey {
    pub source: PathBuf,
    pub entry_point: String,
}

impl KernelKey {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(source: P, entry_point: S) -> Self {
        Self {
            source: source.into(),
            entry_point: entry_point.into(),
        }
    }
}

impl fmt::Display for KernelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.source.display(), self.entry_point)
    }
}

/// A kernel ready to dispatch.
pub struct CompiledKernel<B: ComputeBackend> {
    key: KernelKey,
    kernel: B::Kernel,
    // Serializes argument binding and enqueue on the shared kernel.
    dispatch_lock: Mutex<()>,
}

impl<B: ComputeBackend> CompiledKernel<B> {
    pub fn new(key: KernelKey, kernel: B::Kernel) -> Self {
        Self {
            key,
            kernel,
            dispatch_lock: Mutex::new(()),
        }
    }

    pub fn key(&self) -> &KernelKey {
        &self.key
    }

    pub fn source(&self) -> &Path {
        &self.key.source
    }

    pub fn entry_point(&self) -> &str {
        &self.key.entry_point
    }

    pub fn raw(&self) -> &B::Kernel {
        &self.kernel
    }

    pub(crate) fn lock_dispatch(&self) -> MutexGuard<'_, ()> {
        self.dispatch_lock.lock()
    }
}

impl<B: ComputeBackend> fmt::Debug for CompiledKernel<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledKernel").field("key", &self.key).finish()
    }
}

/// Whether a lookup was served from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Hit,
    Compiled,
}

/// Map from kernel key to compiled kernel.
pub struct KernelCache<B: ComputeBackend> {
    entries: Mutex<HashMap<KernelKey, Arc<CompiledKernel<B>>>>,
}

impl<B: ComputeBackend> KernelCache<B> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached kernel for `key`, or build and insert it.
    ///
    /// The cache lock is held while `build` runs, so concurrent misses on
    /// the same key compile once. A failed build leaves the cache as it was.
    pub fn get_or_build<F>(&self, key: &KernelKey, build: F) -> Result<(Arc<CompiledKernel<B>>, Lookup)>
    where
        F: FnOnce() -> Result<B::Kernel>,
    {
        let mut entries = self.entries.lock();
        if let Some(kernel) = entries.get(key) {
            return Ok((Arc::clone(kernel), Lookup::Hit));
        }

        let compiled = Arc::new(CompiledKernel::new(key.clone(), build()?));
        entries.insert(key.clone(), Arc::clone(&compiled));
        Ok((compiled, Lookup::Compiled))
    }

    pub fn get(&self, key: &KernelKey) -> Option<Arc<CompiledKernel<B>>> {
        self.entries.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &KernelKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// True when any entry point of `source` is cached.
    pub fn contains_source(&self, source: &Path) -> bool {
        self.entries.lock().keys().any(|key| key.source == source)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn keys(&self) -> Vec<KernelKey> {
        self.entries.lock().keys().cloned().collect()
    }
}

impl<B: ComputeBackend> Default for KernelCache<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: ComputeBackend> fmt::Debug for KernelCache<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelCache").field("entries", &self.keys()).finish()
    }
}

/// Read a kernel source file.
pub fn load_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| Error::KernelSourceNotFound {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::host::HostBackend;
    use std::cell::Cell;

    type Cache = KernelCache<HostBackend>;

    fn fake_kernel(backend: &HostBackend, entry: &str) -> Result<<HostBackend as ComputeBackend>::Kernel> {
        let device = backend.probe_platform()?.cpu.ok_or_else(|| Error::no_device("cpu"))?.handle;
        let context = backend.create_context(&device)?;
        let source = format!("__kernel void {}(__global float* a) {{ }}", entry);
        backend.build_kernel(&context, &device, "inline.cl", &source, entry)
    }

    #[test]
    fn test_miss_then_hit() {
        let backend = HostBackend::new();
        let cache = Cache::new();
        let key = KernelKey::new("inline.cl", "matrix_multiplication");
        let builds = Cell::new(0);

        let (first, lookup) = cache
            .get_or_build(&key, || {
                builds.set(builds.get() + 1);
                fake_kernel(&backend, "matrix_multiplication")
            })
            .unwrap();
        assert_eq!(lookup, Lookup::Compiled);

        let (second, lookup) = cache
            .get_or_build(&key, || {
                builds.set(builds.get() + 1);
                fake_kernel(&backend, "matrix_multiplication")
            })
            .unwrap();
        assert_eq!(lookup, Lookup::Hit);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(builds.get(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_failed_build_is_not_cached() {
        let cache = Cache::new();
        let key = KernelKey::new("broken.cl", "matrix_multiplication");

        let result = cache.get_or_build(&key, || Err(Error::compile("broken.cl", "error: nope")));
        assert!(result.is_err());
        assert!(!cache.contains(&key));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_entry_points_are_distinct_keys() {
        let a = KernelKey::new("both.cl", "matrix_multiplication");
        let b = KernelKey::new("both.cl", "_check_normalization");
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "both.cl::matrix_multiplication");
    }

    #[test]
    fn test_load_source_missing_file() {
        let err = load_source(Path::new("/definitely/not/here.cl")).unwrap_err();
        assert!(matches!(err, Error::KernelSourceNotFound { .. }));
        assert!(err.to_string().contains("/definitely/not/here.cl"));
    }
}
