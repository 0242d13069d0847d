//! Accelerator abstraction.
//!
//! The runtime never looks inside a compiled plan. It hands the blob to an
//! `Accelerator`, which deserializes it into a `PlanEngine`; the engine
//! creates `ExecutionContext`s that run against a fixed pair of device
//! addresses. Memory and transfers go through the accelerator as well, so
//! the same inference flow runs on the simulated host device and on a GPU.

use crate::error::{Result, RuntimeError};
use std::fmt;

/// Opaque address of a device allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevicePtr(u64);

impl DevicePtr {
    pub fn from_raw(addr: u64) -> Self {
        Self(addr)
    }

    pub fn addr(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DevicePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Device addresses a plan is executed against, in binding order.
pub type Bindings = [DevicePtr; 2];

/// Slot of the input buffer in `Bindings`.
pub const INPUT_BINDING: usize = 0;
/// Slot of the output buffer in `Bindings`.
pub const OUTPUT_BINDING: usize = 1;

/// Host-side staging memory for `f32` tensors.
///
/// Storage is `f32`-typed so byte views are always correctly aligned for
/// the element type.
pub struct HostBuffer {
    data: Vec<f32>,
}

impl fmt::Debug for HostBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBuffer").field("len", &self.data.len()).finish()
    }
}

impl HostBuffer {
    /// Allocate `len` zeroed elements without aborting on out-of-memory.
    pub fn try_new(len: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|e| {
            RuntimeError::Allocation(format!("host buffer of {len} elements: {e}"))
        })?;
        data.resize(len, 0.0);
        Ok(Self { data })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn byte_len(&self) -> usize {
        std::mem::size_of_val(self.data.as_slice())
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.data)
    }
}

/// A device capable of running compiled plans.
///
/// Every method is blocking: when it returns, the operation has completed
/// on the device.
pub trait Accelerator: Send + Sync {
    /// Human readable device name.
    fn name(&self) -> &str;

    /// Turn a plan blob into an executable engine.
    fn deserialize_plan(&self, blob: &[u8]) -> Result<Box<dyn PlanEngine>>;

    /// Allocate host staging memory of `len` `f32` elements.
    ///
    /// Back-ends that can page-lock memory override this.
    fn alloc_host(&self, len: usize) -> Result<HostBuffer> {
        HostBuffer::try_new(len)
    }

    /// Allocate `bytes` bytes of device memory.
    fn alloc_device(&self, bytes: usize) -> Result<DevicePtr>;

    /// Free a device allocation. Freeing an unknown address is an error.
    fn free_device(&self, ptr: DevicePtr) -> Result<()>;

    /// Copy `src` into the start of the allocation at `dst`.
    fn copy_to_device(&self, dst: DevicePtr, src: &[u8]) -> Result<()>;

    /// Fill `dst` from the start of the allocation at `src`.
    fn copy_to_host(&self, dst: &mut [u8], src: DevicePtr) -> Result<()>;
}

/// A deserialized plan, ready to create execution contexts.
pub trait PlanEngine: Send + Sync {
    /// Name recorded in the plan.
    fn name(&self) -> &str;

    /// Create a context that can execute the plan.
    fn create_context(&self) -> Result<Box<dyn ExecutionContext>>;
}

/// Per-handle execution state of a plan.
pub trait ExecutionContext: Send {
    /// Run the plan reading `bindings[INPUT_BINDING]` and writing
    /// `bindings[OUTPUT_BINDING]`. Blocks until the device is done.
    fn execute(&mut self, bindings: &Bindings) -> Result<()>;
}
