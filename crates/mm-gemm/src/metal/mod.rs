//! Metal GPU GEMM backend (macOS only).
//!
//! Mirrors the four host variants as device kernels plus a tiled NN kernel.
//! Host-slice calls copy operands into temporary device buffers; the
//! `*_on_device` entry points work directly on caller-owned [`DeviceBuffer`]s
//! with per-operand element offsets.

mod buffer;
mod context;
mod registry;

pub use buffer::DeviceBuffer;
pub use context::MetalContext;
pub use registry::{DeviceKernel, KernelRegistry};

use std::mem::size_of;
use std::ptr::NonNull;

use objc2_metal::{
    MTLCommandBuffer, MTLCommandEncoder, MTLCommandQueue, MTLComputeCommandEncoder,
    MTLComputePipelineState, MTLSize,
};
use tracing::{debug, trace};

use crate::backend::MatrixMultiplyBackend;
use crate::config::DeviceConfig;
use crate::error::{GemmError, Result};
use crate::geometry::LaunchGeometry;
use crate::layout::{Gemm, GemmVariant};
use context::ns_error;

/// Kernel argument block; layout matches `GemmParams` in the shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct GemmParams {
    m: u32,
    n: u32,
    k: u32,
    alpha: f32,
    a_off: u32,
    lda: u32,
    b_off: u32,
    ldb: u32,
    beta: f32,
    c_off: u32,
    ldc: u32,
}

fn device_index(what: &'static str, value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| GemmError::IndexOverflow { what, value })
}

impl GemmParams {
    /// Packs the launch arguments.
    ///
    /// The shaders index with 32-bit arithmetic, so every `off + extent`
    /// must fit in `u32`, not just the offset and stride on their own.
    fn new(op: &Gemm, strides: &DeviceStrides) -> Result<Self> {
        let [a_len, b_len, c_len] = op.extents(strides.lda, strides.ldb, strides.ldc)?;
        device_index("a_off + extent", strides.a_off.saturating_add(a_len))?;
        device_index("b_off + extent", strides.b_off.saturating_add(b_len))?;
        device_index("c_off + extent", strides.c_off.saturating_add(c_len))?;
        Ok(GemmParams {
            m: device_index("m", op.m)?,
            n: device_index("n", op.n)?,
            k: device_index("k", op.k)?,
            alpha: op.alpha,
            a_off: device_index("a_off", strides.a_off)?,
            lda: device_index("lda", strides.lda)?,
            b_off: device_index("b_off", strides.b_off)?,
            ldb: device_index("ldb", strides.ldb)?,
            beta: op.beta,
            c_off: device_index("c_off", strides.c_off)?,
            ldc: device_index("ldc", strides.ldc)?,
        })
    }
}

/// Element offsets and leading dimensions of the three device operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceStrides {
    pub a_off: usize,
    pub lda: usize,
    pub b_off: usize,
    pub ldb: usize,
    pub c_off: usize,
    pub ldc: usize,
}

impl DeviceStrides {
    /// Zero offsets with the given leading dimensions.
    pub fn packed(lda: usize, ldb: usize, ldc: usize) -> Self {
        DeviceStrides {
            lda,
            ldb,
            ldc,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Route {
    Dispatch,
    Fast,
}

/// Metal implementation of [`MatrixMultiplyBackend`].
#[derive(Debug)]
pub struct MetalBackend {
    context: MetalContext,
    config: DeviceConfig,
    registry: KernelRegistry,
}

impl MetalBackend {
    /// Open the default device with the largest block its threadgroups allow.
    pub fn new() -> Result<Self> {
        let context = MetalContext::new()?;
        let config = DeviceConfig::fitted(context.max_threads_per_group())?;
        debug!(block = config.block, "fitted device geometry");
        Ok(Self::from_parts(context, config))
    }

    /// Open the default device with an explicit geometry.
    pub fn with_config(config: DeviceConfig) -> Result<Self> {
        config.validate()?;
        let context = MetalContext::new()?;
        Ok(Self::from_parts(context, config))
    }

    fn from_parts(context: MetalContext, config: DeviceConfig) -> Self {
        MetalBackend {
            context,
            config,
            registry: KernelRegistry::new(config),
        }
    }

    pub fn context(&self) -> &MetalContext {
        &self.context
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn registry(&self) -> &KernelRegistry {
        &self.registry
    }

    /// Copy `data` into a new device buffer owned by the caller.
    pub fn upload(&self, data: &[f32]) -> Result<DeviceBuffer> {
        DeviceBuffer::from_slice(&self.context, data)
    }

    /// GEMM on device-resident operands.
    ///
    /// Picks the NN/NT/TN/TT kernel from the transpose flags. `strides`
    /// carries element offsets into each buffer so the call can address a
    /// sub-region of a larger tensor. `c` is written in place.
    pub fn gemm_on_device(
        &self,
        op: &Gemm,
        a: &DeviceBuffer,
        b: &DeviceBuffer,
        c: &DeviceBuffer,
        strides: &DeviceStrides,
    ) -> Result<()> {
        let kernel = DeviceKernel::for_variant(op.variant());
        let geometry = LaunchGeometry::general(op.m, op.n, &self.config);
        self.launch(kernel, geometry, op, a, b, c, strides)
    }

    /// Tiled NN GEMM on device-resident operands.
    ///
    /// Only the no-transpose case has a tiled kernel; other variants are
    /// rejected rather than routed to the general kernels.
    pub fn gemm_on_device_fast(
        &self,
        op: &Gemm,
        a: &DeviceBuffer,
        b: &DeviceBuffer,
        c: &DeviceBuffer,
        strides: &DeviceStrides,
    ) -> Result<()> {
        if op.variant() != GemmVariant::NN {
            return Err(GemmError::UnsupportedVariant {
                kernel: DeviceKernel::NnFast.entry_point(),
                variant: op.variant().as_str(),
            });
        }
        let geometry = LaunchGeometry::fast(op.m, op.n, &self.config);
        self.launch(DeviceKernel::NnFast, geometry, op, a, b, c, strides)
    }

    /// Host-slice convenience around [`Self::gemm_on_device_fast`].
    #[allow(clippy::too_many_arguments)]
    pub fn gemm_fast(
        &self,
        op: &Gemm,
        a: &[f32],
        lda: usize,
        b: &[f32],
        ldb: usize,
        c: &mut [f32],
        ldc: usize,
    ) -> Result<()> {
        self.offload(Route::Fast, op, a, lda, b, ldb, c, ldc)
    }

    #[allow(clippy::too_many_arguments)]
    fn offload(
        &self,
        route: Route,
        op: &Gemm,
        a: &[f32],
        lda: usize,
        b: &[f32],
        ldb: usize,
        c: &mut [f32],
        ldc: usize,
    ) -> Result<()> {
        let [a_len, b_len, c_len] = op.check(a.len(), lda, b.len(), ldb, c.len(), ldc)?;
        if op.m == 0 || op.n == 0 {
            return Ok(());
        }

        let a_buf = self.upload(&a[..a_len])?;
        let b_buf = self.upload(&b[..b_len])?;
        // C is uploaded too: beta may keep part of its old value.
        let c_buf = self.upload(&c[..c_len])?;

        let strides = DeviceStrides::packed(lda, ldb, ldc);
        match route {
            Route::Dispatch => self.gemm_on_device(op, &a_buf, &b_buf, &c_buf, &strides)?,
            Route::Fast => self.gemm_on_device_fast(op, &a_buf, &b_buf, &c_buf, &strides)?,
        }
        c_buf.read_into(&mut c[..c_len])
    }

    #[allow(clippy::too_many_arguments)]
    #[allow(unused_unsafe)]
    fn launch(
        &self,
        kernel: DeviceKernel,
        geometry: LaunchGeometry,
        op: &Gemm,
        a: &DeviceBuffer,
        b: &DeviceBuffer,
        c: &DeviceBuffer,
        strides: &DeviceStrides,
    ) -> Result<()> {
        op.check(
            a.len().saturating_sub(strides.a_off),
            strides.lda,
            b.len().saturating_sub(strides.b_off),
            strides.ldb,
            c.len().saturating_sub(strides.c_off),
            strides.ldc,
        )?;
        if geometry.is_empty() {
            return Ok(());
        }

        let params = GemmParams::new(op, strides)?;

        let pipeline = self.registry.get_or_compile(self.context.device(), kernel)?;
        let limit = pipeline.maxTotalThreadsPerThreadgroup();
        match kernel {
            DeviceKernel::NnFast => self.config.check_fast(limit)?,
            _ => self.config.check_block(limit)?,
        }

        trace!(
            kernel = %kernel,
            groups = ?geometry.groups,
            threads = ?geometry.threads_per_group,
            "launching gemm"
        );

        let command_buffer = self
            .context
            .queue()
            .commandBuffer()
            .ok_or_else(|| GemmError::device("commandBuffer", "queue returned nil"))?;
        let encoder = command_buffer.computeCommandEncoder().ok_or_else(|| {
            GemmError::device("computeCommandEncoder", "command buffer returned nil")
        })?;

        // SAFETY: buffer indices and the argument block match the kernel
        // signatures, and every buffer outlives the blocking wait below.
        unsafe {
            encoder.setComputePipelineState(pipeline);
            encoder.setBuffer_offset_atIndex(Some(a.raw()), 0, 0);
            encoder.setBuffer_offset_atIndex(Some(b.raw()), 0, 1);
            encoder.setBuffer_offset_atIndex(Some(c.raw()), 0, 2);
            encoder.setBytes_length_atIndex(
                NonNull::from(&params).cast(),
                size_of::<GemmParams>(),
                3,
            );
            encoder.dispatchThreadgroups_threadsPerThreadgroup(
                MTLSize {
                    width: geometry.groups[0],
                    height: geometry.groups[1],
                    depth: 1,
                },
                MTLSize {
                    width: geometry.threads_per_group[0],
                    height: geometry.threads_per_group[1],
                    depth: 1,
                },
            );
            encoder.endEncoding();
            command_buffer.commit();
            command_buffer.waitUntilCompleted();
        }

        match command_buffer.error() {
            Some(err) => Err(ns_error("commandBuffer", &err)),
            None => Ok(()),
        }
    }
}

impl MatrixMultiplyBackend for MetalBackend {
    fn name(&self) -> &str {
        "metal"
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
        self.offload(Route::Dispatch, op, a, lda, b, ldb, c, ldc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_layout() {
        assert_eq!(size_of::<GemmParams>(), 11 * 4);
    }

    #[test]
    fn test_device_index_overflow() {
        assert_eq!(device_index("m", 7).unwrap(), 7);
        let err = device_index("lda", usize::MAX).unwrap_err();
        assert!(matches!(err, GemmError::IndexOverflow { what: "lda", .. }));
    }

    #[test]
    fn test_params_reject_wrapping_device_index() {
        let op = Gemm::new(2, 2, 2);
        let wide = u32::MAX as usize;

        // lda fits in u32 but the second row of A does not.
        let err = GemmParams::new(&op, &DeviceStrides::packed(wide, 2, 2)).unwrap_err();
        assert!(matches!(
            err,
            GemmError::IndexOverflow {
                what: "a_off + extent",
                ..
            }
        ));

        let strides = DeviceStrides {
            c_off: wide - 2,
            ..DeviceStrides::packed(2, 2, 2)
        };
        let err = GemmParams::new(&op, &strides).unwrap_err();
        assert!(matches!(
            err,
            GemmError::IndexOverflow {
                what: "c_off + extent",
                ..
            }
        ));

        let strides = DeviceStrides {
            b_off: 7,
            ..DeviceStrides::packed(2, 3, 2)
        };
        let params = GemmParams::new(&op, &strides).unwrap();
        assert_eq!((params.b_off, params.ldb, params.ldc), (7, 3, 2));
    }

    #[test]
    fn test_packed_strides() {
        let s = DeviceStrides::packed(3, 4, 5);
        assert_eq!((s.a_off, s.b_off, s.c_off), (0, 0, 0));
        assert_eq!((s.lda, s.ldb, s.ldc), (3, 4, 5));
    }
}
