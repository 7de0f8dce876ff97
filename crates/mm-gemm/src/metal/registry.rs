use std::fmt;
use std::sync::{Mutex, OnceLock, PoisonError};

use objc2::rc::Retained;
use objc2::runtime::ProtocolObject;
use objc2_foundation::NSString;
use objc2_metal::{MTLComputePipelineState, MTLDevice, MTLLibrary};
use tracing::debug;

use crate::config::DeviceConfig;
use crate::error::{GemmError, Result};
use crate::layout::GemmVariant;
use crate::metal::context::ns_error;

const GEMM_SOURCE: &str = include_str!("shaders/gemm.metal");
const GEMM_FAST_SOURCE: &str = include_str!("shaders/gemm_fast.metal");

pub type Pipeline = Retained<ProtocolObject<dyn MTLComputePipelineState>>;

/// Compiled device kernels, one registry slot each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKernel {
    Nn,
    Nt,
    Tn,
    Tt,
    NnFast,
}

impl DeviceKernel {
    pub const ALL: [DeviceKernel; 5] = [
        DeviceKernel::Nn,
        DeviceKernel::Nt,
        DeviceKernel::Tn,
        DeviceKernel::Tt,
        DeviceKernel::NnFast,
    ];

    pub fn for_variant(variant: GemmVariant) -> Self {
        match variant {
            GemmVariant::NN => DeviceKernel::Nn,
            GemmVariant::NT => DeviceKernel::Nt,
            GemmVariant::TN => DeviceKernel::Tn,
            GemmVariant::TT => DeviceKernel::Tt,
        }
    }

    pub fn entry_point(self) -> &'static str {
        match self {
            DeviceKernel::Nn => "gemm_nn",
            DeviceKernel::Nt => "gemm_nt",
            DeviceKernel::Tn => "gemm_tn",
            DeviceKernel::Tt => "gemm_tt",
            DeviceKernel::NnFast => "gemm_nn_fast",
        }
    }

    fn source(self) -> &'static str {
        match self {
            DeviceKernel::NnFast => GEMM_FAST_SOURCE,
            _ => GEMM_SOURCE,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for DeviceKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.entry_point())
    }
}

/// Initialize-or-fetch cache of compiled pipelines.
///
/// Owned by one backend; each kernel is compiled at most once per registry.
pub struct KernelRegistry {
    config: DeviceConfig,
    slots: [OnceLock<Pipeline>; DeviceKernel::ALL.len()],
    compile_lock: Mutex<()>,
}

// SAFETY: compute pipeline states are immutable and documented as
// thread-safe; slot initialization is serialized by `compile_lock`.
unsafe impl Send for KernelRegistry {}
unsafe impl Sync for KernelRegistry {}

impl fmt::Debug for KernelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let compiled: Vec<_> = DeviceKernel::ALL
            .iter()
            .filter(|k| self.is_compiled(**k))
            .map(|k| k.entry_point())
            .collect();
        f.debug_struct("KernelRegistry")
            .field("config", &self.config)
            .field("compiled", &compiled)
            .finish()
    }
}

impl KernelRegistry {
    pub fn new(config: DeviceConfig) -> Self {
        KernelRegistry {
            config,
            slots: Default::default(),
            compile_lock: Mutex::new(()),
        }
    }

    pub fn is_compiled(&self, kernel: DeviceKernel) -> bool {
        self.slots[kernel.slot()].get().is_some()
    }

    /// Return the pipeline for `kernel`, compiling it on first use.
    pub fn get_or_compile(
        &self,
        device: &ProtocolObject<dyn MTLDevice>,
        kernel: DeviceKernel,
    ) -> Result<&Pipeline> {
        let slot = &self.slots[kernel.slot()];
        if let Some(pipeline) = slot.get() {
            return Ok(pipeline);
        }

        let _guard = self
            .compile_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(pipeline) = slot.get() {
            return Ok(pipeline);
        }

        let pipeline = compile(device, kernel, &self.config)?;
        Ok(slot.get_or_init(|| pipeline))
    }
}

fn compile(
    device: &ProtocolObject<dyn MTLDevice>,
    kernel: DeviceKernel,
    config: &DeviceConfig,
) -> Result<Pipeline> {
    let defines = config.defines();
    debug!(
        kernel = %kernel,
        defines = %defines.trim_end().replace('\n', "; "),
        "compiling device kernel"
    );

    let source = NSString::from_str(&format!("{defines}{}", kernel.source()));
    let library = device
        .newLibraryWithSource_options_error(&source, None)
        .map_err(|e| ns_error("newLibraryWithSource", &e))?;
    let function = library
        .newFunctionWithName(&NSString::from_str(kernel.entry_point()))
        .ok_or_else(|| GemmError::device("newFunctionWithName", kernel.entry_point()))?;
    device
        .newComputePipelineStateWithFunction_error(&function)
        .map_err(|e| ns_error("newComputePipelineState", &e))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_entry_points_are_in_sources() {
        for kernel in DeviceKernel::ALL {
            assert!(
                kernel.source().contains(kernel.entry_point()),
                "{kernel} missing from its source"
            );
        }
    }

    #[test]
    fn test_slots_are_distinct() {
        let slots: HashSet<_> = DeviceKernel::ALL.iter().map(|k| k.slot()).collect();
        assert_eq!(slots.len(), DeviceKernel::ALL.len());
        assert!(slots.iter().all(|&slot| slot < DeviceKernel::ALL.len()));
    }

    #[test]
    fn test_for_variant() {
        assert_eq!(DeviceKernel::for_variant(GemmVariant::TN), DeviceKernel::Tn);
        assert_eq!(DeviceKernel::for_variant(GemmVariant::NT).entry_point(), "gemm_nt");
    }
}
