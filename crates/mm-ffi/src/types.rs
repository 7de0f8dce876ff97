/// Status codes returned by all FFI functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MMStatus {
    Ok = 0,
    ErrorInvalidArgument = 1,
    ErrorDevice = 2,
    ErrorInternal = 3,
}

/// Compute backend type selector.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MMBackendType {
    Cpu = 0,
    Metal = 1,
}

impl From<MMBackendType> for mm_gemm::BackendKind {
    fn from(kind: MMBackendType) -> Self {
        match kind {
            MMBackendType::Cpu => mm_gemm::BackendKind::Cpu,
            MMBackendType::Metal => mm_gemm::BackendKind::Metal,
        }
    }
}
