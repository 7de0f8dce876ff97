use objc2::rc::Retained;
use objc2::runtime::ProtocolObject;
use objc2_foundation::NSError;
use objc2_metal::{MTLCommandQueue, MTLCreateSystemDefaultDevice, MTLDevice};
use tracing::debug;

use crate::error::{GemmError, Result};

/// The system default Metal device and the single command queue every
/// launch is submitted to.
#[derive(Debug)]
pub struct MetalContext {
    device: Retained<ProtocolObject<dyn MTLDevice>>,
    queue: Retained<ProtocolObject<dyn MTLCommandQueue>>,
}

// SAFETY: MTLDevice and MTLCommandQueue are documented as thread-safe; the
// context never hands out mutable access to either.
unsafe impl Send for MetalContext {}
unsafe impl Sync for MetalContext {}

impl MetalContext {
    /// Open the system default device.
    ///
    /// Returns `GemmError::DeviceUnavailable` on machines without Metal.
    #[allow(unused_unsafe)]
    pub fn new() -> Result<Self> {
        let device =
            unsafe { MTLCreateSystemDefaultDevice() }.ok_or(GemmError::DeviceUnavailable)?;
        let queue = device
            .newCommandQueue()
            .ok_or_else(|| GemmError::device("newCommandQueue", "device returned nil"))?;
        debug!(device = %device.name(), "opened metal device");
        Ok(MetalContext { device, queue })
    }

    pub fn device(&self) -> &ProtocolObject<dyn MTLDevice> {
        &self.device
    }

    pub fn queue(&self) -> &ProtocolObject<dyn MTLCommandQueue> {
        &self.queue
    }

    /// Threads a single threadgroup may hold on this device.
    ///
    /// Metal caps the total per group at the x-axis limit.
    pub fn max_threads_per_group(&self) -> usize {
        self.device.maxThreadsPerThreadgroup().width
    }

    pub fn device_name(&self) -> String {
        self.device.name().to_string()
    }
}

/// Converts an `NSError` into a device failure tagged with the call site.
pub(crate) fn ns_error(op: &'static str, err: &NSError) -> GemmError {
    GemmError::Device {
        op,
        code: err.code(),
        message: err.localizedDescription().to_string(),
    }
}
