//! Blocking session calls run on dedicated threads and awaited from async code.

use crate::backend::ComputeBackend;
use crate::error::{Error, Result};
use crate::matrix::MatrixLike;
use crate::session::ComputeSession;
use async_channel::{bounded, Receiver};
use futures::Future;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

static NEXT_THREAD: AtomicUsize = AtomicUsize::new(0);

/// Run `job` against `session` on a dedicated thread.
///
/// The thread is named after `Config::thread_name_prefix`. Dropping the
/// handle does not cancel the job; the device call always runs to
/// completion.
pub fn offload<B, F, T>(session: Arc<ComputeSession<B>>, job: F) -> Result<OffloadHandle<T>>
where
    B: ComputeBackend,
    F: FnOnce(&ComputeSession<B>) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let (sender, receiver) = bounded(1);
    let name = format!(
        "{}-{}",
        session.config().thread_name_prefix,
        NEXT_THREAD.fetch_add(1, Ordering::Relaxed)
    );

    std::thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            let result = job(&session);
            let _ = sender.send_blocking(result);
        })
        .map_err(|e| Error::async_error(format!("failed to spawn {}: {}", name, e)))?;

    Ok(OffloadHandle { receiver })
}

/// [`ComputeSession::multiply`] on an offload thread.
pub fn multiply_async<B, M>(session: Arc<ComputeSession<B>>, a: M, b: M) -> Result<OffloadHandle<M>>
where
    B: ComputeBackend,
    M: MatrixLike + Send + 'static,
{
    offload(session, move |s| s.multiply(&a, &b))
}

/// [`ComputeSession::is_uniformly_spaced`] on an offload thread.
pub fn is_uniformly_spaced_async<B>(session: Arc<ComputeSession<B>>, timestamps: Vec<f64>) -> Result<OffloadHandle<bool>>
where
    B: ComputeBackend,
{
    offload(session, move |s| s.is_uniformly_spaced(&timestamps))
}

/// Block on a future in the current thread
pub fn block_on<F>(future: F) -> F::Output
where
    F: Future,
{
    futures::executor::block_on(future)
}

/// Handle for the result of an offloaded call
pub struct OffloadHandle<T> {
    receiver: Receiver<Result<T>>,
}

impl<T> OffloadHandle<T> {
    /// Wait for the call to complete and get its result
    pub async fn join(self) -> Result<T> {
        self.receiver
            .recv()
            .await
            .map_err(|_| Error::async_error("offload thread exited without a result"))?
    }

    /// Try to get the result without waiting
    pub fn try_join(&self) -> Option<Result<T>> {
        self.receiver.try_recv().ok()
    }

    /// Block the current thread until the call completes
    pub fn wait(self) -> Result<T> {
        block_on(self.join())
    }
}

impl<T> fmt::Debug for OffloadHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OffloadHandle")
            .field("ready", &!self.receiver.is_empty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::host::{Fault, HostBackend};
    use crate::config::Config;
    use crate::matrix::Matrix;

    fn session(backend: HostBackend) -> Arc<ComputeSession<HostBackend>> {
        let config = Config::builder()
            .kernel_dir(concat!(env!("CARGO_MANIFEST_DIR"), "/kernels"))
            .thread_name_prefix("offload-test")
            .build()
            .unwrap();
        Arc::new(ComputeSession::new(backend, config))
    }

    #[test]
    fn test_offload_runs_on_named_thread() {
        let session = session(HostBackend::new());
        let handle = offload(session, |_| {
            Ok(std::thread::current().name().unwrap_or_default().to_string())
        })
        .unwrap();

        let name = handle.wait().unwrap();
        assert!(name.starts_with("offload-test-"));
    }

    #[test]
    fn test_multiply_async() {
        let session = session(HostBackend::new());
        let a = Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();
        let b = Matrix::from_rows(&[[5.0, 6.0], [7.0, 8.0]]).unwrap();

        let c = block_on(multiply_async(session, a, b).unwrap().join()).unwrap();
        assert_eq!(c.as_slice(), &[19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_errors_cross_the_bridge() {
        let backend = HostBackend::new();
        backend.fail_next(Fault::Context, 1);
        let session = session(backend);

        let err = is_uniformly_spaced_async(session, vec![0.0, 1.0, 2.0])
            .unwrap()
            .wait()
            .unwrap_err();
        assert!(matches!(err, Error::Context(_)));
    }

    #[test]
    fn test_panicking_job_reports_async_error() {
        let session = session(HostBackend::new());
        let handle = offload::<_, _, ()>(session, |_| panic!("job failed"));
        let err = handle.unwrap().wait().unwrap_err();
        assert!(matches!(err, Error::Async(_)));
    }
}
