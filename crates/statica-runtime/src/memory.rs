//! Host and device buffer allocation.
//!
//! Buffers are sized once from the fixed shape contract and never resized.
//! Device memory is owned by `DeviceBuffer`, which frees itself on drop, so
//! an allocation that fails halfway leaves nothing behind.

use crate::device::{Accelerator, Bindings, DevicePtr, HostBuffer};
use crate::error::{Result, RuntimeError};
use std::sync::Arc;

/// Owned device allocation.
pub struct DeviceBuffer {
    ptr: Option<DevicePtr>,
    bytes: usize,
    accelerator: Arc<dyn Accelerator>,
}

impl DeviceBuffer {
    fn new(accelerator: &Arc<dyn Accelerator>, bytes: usize) -> Result<Self> {
        let ptr = accelerator.alloc_device(bytes)?;
        Ok(Self {
            ptr: Some(ptr),
            bytes,
            accelerator: Arc::clone(accelerator),
        })
    }

    /// Device address, or an error once the buffer has been released.
    pub fn ptr(&self) -> Result<DevicePtr> {
        self.ptr
            .ok_or_else(|| RuntimeError::Execution("device buffer already released".to_string()))
    }

    pub fn byte_len(&self) -> usize {
        self.bytes
    }

    pub fn is_released(&self) -> bool {
        self.ptr.is_none()
    }

    /// Free the device memory. Later calls do nothing.
    pub fn release(&mut self) -> Result<()> {
        match self.ptr.take() {
            Some(ptr) => self.accelerator.free_device(ptr),
            None => Ok(()),
        }
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!("Failed to free device buffer: {e}");
        }
    }
}

impl std::fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("ptr", &self.ptr)
            .field("bytes", &self.bytes)
            .finish()
    }
}

/// The matched host/device buffer pairs of one executor.
#[derive(Debug)]
pub struct BufferSet {
    pub host_in: HostBuffer,
    pub host_out: HostBuffer,
    pub dev_in: DeviceBuffer,
    pub dev_out: DeviceBuffer,
}

impl BufferSet {
    /// The fixed `[input, output]` binding pair.
    pub fn bindings(&self) -> Result<Bindings> {
        Ok([self.dev_in.ptr()?, self.dev_out.ptr()?])
    }

    /// Free both device buffers. Both are attempted; the first error wins.
    pub fn release(&mut self) -> Result<()> {
        let input = self.dev_in.release();
        let output = self.dev_out.release();
        input.and(output)
    }
}

/// Allocates the buffers an executor needs.
pub struct MemoryAllocator {
    accelerator: Arc<dyn Accelerator>,
}

impl MemoryAllocator {
    pub fn new(accelerator: Arc<dyn Accelerator>) -> Self {
        Self { accelerator }
    }

    /// Allocate host and device buffers for `input_volume` and
    /// `output_volume` `f32` elements.
    ///
    /// # Errors
    /// Returns `RuntimeError::Allocation` on zero volumes or when host or
    /// device memory runs out. Anything allocated before the failure has
    /// been freed by the time the error is returned.
    #[tracing::instrument(skip(self))]
    pub fn allocate(&self, input_volume: usize, output_volume: usize) -> Result<BufferSet> {
        if input_volume == 0 || output_volume == 0 {
            return Err(RuntimeError::Allocation(format!(
                "buffer volumes must be non-zero, got {input_volume} and {output_volume}"
            )));
        }
        let input_bytes = byte_size(input_volume)?;
        let output_bytes = byte_size(output_volume)?;

        let host_in = self.accelerator.alloc_host(input_volume)?;
        let host_out = self.accelerator.alloc_host(output_volume)?;
        let dev_in = DeviceBuffer::new(&self.accelerator, input_bytes)?;
        let dev_out = DeviceBuffer::new(&self.accelerator, output_bytes)?;

        tracing::debug!(input_bytes, output_bytes, "Allocated buffers");
        Ok(BufferSet {
            host_in,
            host_out,
            dev_in,
            dev_out,
        })
    }
}

fn byte_size(volume: usize) -> Result<usize> {
    volume
        .checked_mul(size_of::<f32>())
        .ok_or_else(|| RuntimeError::Allocation(format!("volume {volume} overflows")))
}
