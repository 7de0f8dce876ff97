pub mod matmul;

use crate::backend::MatrixMultiplyBackend;
use crate::error::Result;
use crate::layout::{Gemm, GemmVariant};

/// Pure-Rust host GEMM backend.
///
/// Single-threaded triple loops, one per transpose variant. This is the
/// numerical reference the device backend is checked against.
#[derive(Debug, Clone)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        CpuBackend
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MatrixMultiplyBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn gemm(
        &self,
        op: &Gemm,
        a: &[f32],
        lda: usize,
        b: &[f32],
        ldb: usize,
        c: &mut [f32],
        ldc: usize,
    ) -> Result<()> {
        op.check(a.len(), lda, b.len(), ldb, c.len(), ldc)?;
        gemm(op, a, lda, b, ldb, c, ldc);
        Ok(())
    }
}

/// Host dispatcher: scales the `m x n` region of C by beta, then runs the
/// kernel selected by the transpose flags.
///
/// No validation happens here. Out-of-range extents panic on slice indexing;
/// use [`CpuBackend`] through [`MatrixMultiplyBackend::gemm`] for checked calls.
#[allow(clippy::too_many_arguments)]
pub fn gemm(op: &Gemm, a: &[f32], lda: usize, b: &[f32], ldb: usize, c: &mut [f32], ldc: usize) {
    let Gemm { m, n, k, alpha, .. } = *op;
    if m == 0 || n == 0 {
        return;
    }

    scale(m, n, op.beta, c, ldc);

    if k == 0 || alpha == 0.0 {
        return;
    }

    match op.variant() {
        GemmVariant::NN => matmul::gemm_nn(m, n, k, alpha, a, lda, b, ldb, c, ldc),
        GemmVariant::NT => matmul::gemm_nt(m, n, k, alpha, a, lda, b, ldb, c, ldc),
        GemmVariant::TN => matmul::gemm_tn(m, n, k, alpha, a, lda, b, ldb, c, ldc),
        GemmVariant::TT => matmul::gemm_tt(m, n, k, alpha, a, lda, b, ldb, c, ldc),
    }
}

/// `C[i, j] <- beta * C[i, j]` over the logical region.
///
/// beta == 0 assigns zero so NaN and uninitialised values are overwritten.
fn scale(m: usize, n: usize, beta: f32, c: &mut [f32], ldc: usize) {
    if beta == 1.0 {
        return;
    }
    for i in 0..m {
        let row = &mut c[i * ldc..i * ldc + n];
        if beta == 0.0 {
            row.fill(0.0);
        } else {
            row.iter_mut().for_each(|v| *v *= beta);
        }
    }
}
