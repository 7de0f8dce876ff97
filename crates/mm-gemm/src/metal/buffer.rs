use std::ffi::c_void;
use std::mem::size_of;
use std::ptr::NonNull;

use objc2::rc::Retained;
use objc2::runtime::ProtocolObject;
use objc2_metal::{MTLBuffer, MTLDevice, MTLResourceOptions};

use crate::error::{GemmError, Result};
use crate::metal::context::MetalContext;

/// Device-resident `f32` storage in shared (CPU-visible) memory.
///
/// Dropping the buffer releases the underlying `MTLBuffer`. The type is
/// `Send` but not `Sync`: host reads and writes go through `&self`/`&mut self`
/// while every launch blocks the calling thread until the device finishes.
#[derive(Debug)]
pub struct DeviceBuffer {
    raw: Retained<ProtocolObject<dyn MTLBuffer>>,
    len: usize,
}

// SAFETY: the buffer is only reachable through this owner; moving it to
// another thread moves the only handle.
unsafe impl Send for DeviceBuffer {}

impl DeviceBuffer {
    /// Allocate a buffer holding a copy of `data`.
    #[allow(unused_unsafe)]
    pub fn from_slice(context: &MetalContext, data: &[f32]) -> Result<Self> {
        if data.is_empty() {
            return Self::zeroed(context, 0);
        }
        let bytes = std::mem::size_of_val(data);
        let ptr = NonNull::from(data).cast::<c_void>();
        // SAFETY: `ptr` is valid for `bytes` bytes and Metal copies it before returning.
        let raw = unsafe {
            context.device().newBufferWithBytes_length_options(
                ptr,
                bytes,
                MTLResourceOptions::StorageModeShared,
            )
        }
        .ok_or_else(|| GemmError::device("newBufferWithBytes", format!("{bytes} bytes")))?;
        Ok(DeviceBuffer {
            raw,
            len: data.len(),
        })
    }

    /// Allocate a zero-filled buffer of `len` elements.
    #[allow(unused_unsafe)]
    pub fn zeroed(context: &MetalContext, len: usize) -> Result<Self> {
        // Metal rejects zero-length allocations.
        let bytes = len.max(1) * size_of::<f32>();
        let raw = unsafe {
            context
                .device()
                .newBufferWithLength_options(bytes, MTLResourceOptions::StorageModeShared)
        }
        .ok_or_else(|| GemmError::device("newBufferWithLength", format!("{bytes} bytes")))?;
        let mut buffer = DeviceBuffer { raw, len };
        buffer.as_mut_slice().fill(0.0);
        Ok(buffer)
    }

    /// Number of `f32` elements.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn raw(&self) -> &ProtocolObject<dyn MTLBuffer> {
        &self.raw
    }

    #[allow(unused_unsafe)]
    fn as_slice(&self) -> &[f32] {
        // SAFETY: shared storage holds at least `len` f32s and no launch is in
        // flight while a host borrow exists.
        unsafe { std::slice::from_raw_parts(self.raw.contents().as_ptr() as *const f32, self.len) }
    }

    #[allow(unused_unsafe)]
    fn as_mut_slice(&mut self) -> &mut [f32] {
        // SAFETY: as above, and `&mut self` guarantees exclusive host access.
        unsafe {
            std::slice::from_raw_parts_mut(self.raw.contents().as_ptr() as *mut f32, self.len)
        }
    }

    /// Copy the first `dst.len()` elements back to the host.
    pub fn read_into(&self, dst: &mut [f32]) -> Result<()> {
        if dst.len() > self.len {
            return Err(GemmError::OutOfRange {
                start: 0,
                end: dst.len(),
                len: self.len,
            });
        }
        dst.copy_from_slice(&self.as_slice()[..dst.len()]);
        Ok(())
    }

    /// Overwrite elements starting at `offset` with `src`.
    pub fn write_from(&mut self, offset: usize, src: &[f32]) -> Result<()> {
        let end = offset.saturating_add(src.len());
        if end > self.len {
            return Err(GemmError::OutOfRange {
                start: offset,
                end,
                len: self.len,
            });
        }
        self.as_mut_slice()[offset..end].copy_from_slice(src);
        Ok(())
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.as_slice().to_vec()
    }
}
