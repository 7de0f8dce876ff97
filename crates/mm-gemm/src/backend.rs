use std::fmt::{self, Debug};

use tracing::{debug, warn};

use crate::cpu::CpuBackend;
use crate::error::Result;
use crate::layout::Gemm;

/// Trait for pluggable matrix-multiply backends (host, Metal, ...).
///
/// Operands are host slices in row-major order with explicit leading
/// dimensions. Implementations validate extents before touching memory and
/// update `c` in place.
pub trait MatrixMultiplyBackend: Send + Sync + Debug {
    /// Returns the name of this backend (e.g., "cpu", "metal").
    fn name(&self) -> &str;

    /// General matrix multiply: C <- alpha * op(A) * op(B) + beta * C.
    ///
    /// - `a`: row-major data of shape [m, k], or [k, m] when `op.trans_a` is set
    /// - `b`: row-major data of shape [k, n], or [n, k] when `op.trans_b` is set
    /// - `c`: row-major data of shape [m, n], updated in place
    /// - `lda`, `ldb`, `ldc`: distance in elements between consecutive rows
    #[allow(clippy::too_many_arguments)]
    fn gemm(
        &self,
        op: &Gemm,
        a: &[f32],
        lda: usize,
        b: &[f32],
        ldb: usize,
        c: &mut [f32],
        ldc: usize,
    ) -> Result<()>;
}

/// Which backend a caller would like to run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Cpu,
    Metal,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Cpu => write!(f, "cpu"),
            BackendKind::Metal => write!(f, "metal"),
        }
    }
}

/// Build the backend for `kind`, falling back to the host backend when the
/// accelerator is not compiled in or no device is present.
///
/// The choice is made once here; a backend never falls back after a failed
/// device call.
pub fn select_backend(kind: BackendKind) -> Box<dyn MatrixMultiplyBackend> {
    match kind {
        BackendKind::Cpu => {
            debug!("selected cpu gemm backend");
            Box::new(CpuBackend::new())
        }
        BackendKind::Metal => {
            #[cfg(feature = "metal")]
            {
                match crate::metal::MetalBackend::new() {
                    Ok(backend) => {
                        debug!("selected metal gemm backend");
                        return Box::new(backend);
                    }
                    Err(e) => warn!("metal backend unavailable ({e}), using cpu"),
                }
            }
            #[cfg(not(feature = "metal"))]
            warn!("built without the `metal` feature, using cpu gemm backend");
            Box::new(CpuBackend::new())
        }
    }
}
