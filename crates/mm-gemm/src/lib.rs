//! `mm-gemm` - single-precision general matrix multiply.
//!
//! This crate provides:
//! - Host GEMM kernels for the four transpose variants and their dispatcher
//! - A `MatrixMultiplyBackend` trait for pluggable compute (CPU, Metal)
//! - A Metal backend with device-resident, offset-addressed entry points
//!   and a tiled NN kernel (feature `metal`)
//! - An owned `Matrix` type and validated device geometry (`DeviceConfig`)

pub mod backend;
pub mod config;
pub mod cpu;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod matrix;
#[cfg(feature = "metal")]
pub mod metal;

// Re-export primary types at the crate root for convenience.
pub use backend::{select_backend, BackendKind, MatrixMultiplyBackend};
pub use config::DeviceConfig;
pub use cpu::CpuBackend;
pub use error::{GemmError, Operand, Result};
pub use geometry::LaunchGeometry;
pub use layout::{Gemm, GemmVariant, MatrixLayout, Transpose};
pub use matrix::Matrix;
#[cfg(feature = "metal")]
pub use metal::{DeviceBuffer, DeviceStrides, MetalBackend};

/// C <- alpha * op(A) * op(B) + beta * C on the host.
///
/// Unchecked entry point: extents are trusted and violations panic on slice
/// indexing. See [`cpu::gemm`].
#[allow(clippy::too_many_arguments)]
pub fn gemm(
    trans_a: Transpose,
    trans_b: Transpose,
    m: usize,
    n: usize,
    k: usize,
    alpha: f32,
    a: &[f32],
    lda: usize,
    b: &[f32],
    ldb: usize,
    beta: f32,
    c: &mut [f32],
    ldc: usize,
) {
    let op = Gemm {
        trans_a,
        trans_b,
        m,
        n,
        k,
        alpha,
        beta,
    };
    cpu::gemm(&op, a, lda, b, ldb, c, ldc);
}
