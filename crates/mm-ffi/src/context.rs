use std::ffi::CString;

use mm_gemm::{select_backend, BackendKind, MatrixMultiplyBackend};

/// Opaque context handle that owns the selected GEMM backend.
pub struct MMContext {
    pub backend: Box<dyn MatrixMultiplyBackend>,
    name: CString,
}

impl Default for MMContext {
    fn default() -> Self {
        Self::new(BackendKind::Cpu)
    }
}

impl MMContext {
    /// Build a context for `kind`; Metal falls back to the CPU backend when
    /// no device is available.
    pub fn new(kind: BackendKind) -> Self {
        let backend = select_backend(kind);
        let name = CString::new(backend.name()).unwrap_or_default();
        Self { backend, name }
    }

    /// Backend name as a C string owned by the context.
    pub fn name(&self) -> &CString {
        &self.name
    }
}
