//! Single-precision matrix multiplication on the compute device.

use crate::backend::{BufferInit, ComputeBackend, ElemType, HostSlice, HostSliceMut, KernelArg, MemAccess, NdRange};
use crate::error::{Error, Result};
use crate::matrix::MatrixLike;
use crate::session::ComputeSession;

/// Compute `a * b` on the session's device.
///
/// `a` is m x k and `b` is k x n. The kernel accumulates in `f32`, so
/// results match a host product only within float tolerance. Any zero
/// dimension yields an m x n zero matrix without touching the device.
///
/// Blocks until the device has finished; there is no timeout.
pub fn multiply<B: ComputeBackend, M: MatrixLike>(session: &ComputeSession<B>, a: &M, b: &M) -> Result<M> {
    let (m, k) = (a.height(), a.width());
    let n = b.width();
    if b.height() != k {
        return Err(Error::dimension_mismatch(format!(
            "cannot multiply {}x{} by {}x{}",
            m,
            k,
            b.height(),
            n
        )));
    }

    if m == 0 || k == 0 || n == 0 {
        return M::from_row_major(m, n, vec![0.0; m * n]);
    }

    let k_arg = kernel_int(k, "inner dimension")?;
    let n_arg = kernel_int(n, "output width")?;

    let context = session.get_context()?;
    let kernel = session.get_kernel(&session.config().matmul_kernel)?;

    let lhs = flatten(a);
    let rhs = flatten(b);

    let buf_a = session.alloc_buffer(&context, "A", MemAccess::ReadOnly, BufferInit::CopyFrom(HostSlice::F32(&lhs)))?;
    let buf_b = session.alloc_buffer(&context, "B", MemAccess::ReadOnly, BufferInit::CopyFrom(HostSlice::F32(&rhs)))?;
    let buf_c = session.alloc_buffer(
        &context,
        "C",
        MemAccess::WriteOnly,
        BufferInit::Uninit {
            elem: ElemType::F32,
            len: m * n,
        },
    )?;

    let args = [
        buf_a.arg(),
        buf_b.arg(),
        buf_c.arg(),
        KernelArg::Int(k_arg),
        KernelArg::Int(n_arg),
    ];
    let range = NdRange::two_d([m, n], session.config().work_group);
    session.dispatch(&context, &kernel, &args, &range)?;

    let mut out = vec![0.0f32; m * n];
    session.read_buffer(&context, &buf_c, HostSliceMut::F32(&mut out))?;

    M::from_row_major(m, n, out)
}

/// Row-major copy of `matrix`, reading every element once.
pub fn flatten<M: MatrixLike>(matrix: &M) -> Vec<f32> {
    let (rows, cols) = (matrix.height(), matrix.width());
    let mut data = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for col in 0..cols {
            data.push(matrix.value(row, col));
        }
    }
    data
}

fn kernel_int(value: usize, what: &str) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| Error::invalid_argument(format!("{} {} does not fit a kernel int", what, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::host::{Fault, HostBackend};
    use crate::config::Config;
    use crate::matrix::Matrix;

    fn session(backend: HostBackend) -> ComputeSession<HostBackend> {
        let config = Config::builder()
            .kernel_dir(concat!(env!("CARGO_MANIFEST_DIR"), "/kernels"))
            .build()
            .unwrap();
        ComputeSession::new(backend, config)
    }

    #[test]
    fn test_two_by_two() {
        let session = session(HostBackend::new());
        let a = Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();
        let b = Matrix::from_rows(&[[5.0, 6.0], [7.0, 8.0]]).unwrap();

        let c = multiply(&session, &a, &b).unwrap();
        assert_eq!(c, Matrix::from_rows(&[[19.0, 22.0], [43.0, 50.0]]).unwrap());
        assert_eq!(session.live_buffers(), 0);
    }

    #[test]
    fn test_non_square() {
        let session = session(HostBackend::new());
        let a = Matrix::from_rows(&[[1.0, 0.0, 2.0]]).unwrap();
        let b = Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]).unwrap();

        let c = multiply(&session, &a, &b).unwrap();
        assert_eq!((c.rows(), c.cols()), (1, 2));
        assert_eq!(c.as_slice(), &[11.0, 14.0]);
    }

    #[test]
    fn test_shape_mismatch_does_no_device_work() {
        let backend = HostBackend::new();
        let session = session(backend.clone());
        let a = Matrix::zeros(2, 3);
        let b = Matrix::zeros(2, 3);

        assert!(matches!(multiply(&session, &a, &b), Err(Error::DimensionMismatch(_))));
        assert_eq!(backend.stats().probes, 0);
    }

    #[test]
    fn test_degenerate_shapes_return_zeros() {
        let backend = HostBackend::new();
        let session = session(backend.clone());
        let a = Matrix::zeros(3, 0);
        let b = Matrix::zeros(0, 2);

        let c = multiply(&session, &a, &b).unwrap();
        assert_eq!((c.rows(), c.cols()), (3, 2));
        assert!(c.as_slice().iter().all(|v| *v == 0.0));
        assert!(!session.is_initialized());
    }

    #[test]
    fn test_dispatch_failure_releases_buffers() {
        let backend = HostBackend::new();
        let session = session(backend.clone());
        backend.fail_next(Fault::Dispatch, 1);
        let a = Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();

        assert!(matches!(multiply(&session, &a, &a), Err(Error::Dispatch { .. })));
        assert_eq!(session.live_buffers(), 0);
        assert_eq!(backend.live_buffers(), 0);

        // The failure is not sticky.
        assert!(multiply(&session, &a, &a).is_ok());
    }

    #[test]
    fn test_flatten_is_row_major() {
        let m = Matrix::from_rows(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(flatten(&m), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }
}
