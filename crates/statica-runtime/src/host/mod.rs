//! Simulated accelerator backed by host memory.
//!
//! `HostAccelerator` behaves like a discrete device: allocations live in a
//! separate address space, data only moves through explicit copies, and
//! freeing an address twice is an error. It counts every allocation,
//! transfer and execution, and can enforce a memory cap, which makes it the
//! back-end of choice for tests and for machines without a GPU.

mod kernels;

use crate::device::{
    Accelerator, Bindings, DevicePtr, ExecutionContext, INPUT_BINDING, OUTPUT_BINDING, PlanEngine,
};
use crate::error::{LoadError, Result, RuntimeError};
use parking_lot::Mutex;
use statica_plan::{Program, RUNTIME_VERSION};
use std::collections::HashMap;
use std::sync::Arc;

/// First address handed out by the simulated device.
const BASE_ADDR: u64 = 0x7f00_0000_0000;
/// Allocation alignment of the simulated device.
const ALIGNMENT: u64 = 256;

/// Counters kept by the simulated device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Allocations currently alive.
    pub live_allocations: usize,
    /// Bytes currently allocated.
    pub live_bytes: usize,
    /// Successful allocations since creation.
    pub allocs: u64,
    /// Successful frees since creation.
    pub frees: u64,
    /// Host to device copies.
    pub uploads: u64,
    /// Device to host copies.
    pub downloads: u64,
    /// Plan executions.
    pub executions: u64,
}

#[derive(Debug)]
struct MemoryState {
    allocations: HashMap<u64, Vec<u8>>,
    next_addr: u64,
    stats: DeviceStats,
}

impl MemoryState {
    fn allocation(&self, ptr: DevicePtr) -> Result<&Vec<u8>> {
        self.allocations
            .get(&ptr.addr())
            .ok_or_else(|| RuntimeError::Execution(format!("Unknown device address {ptr}")))
    }

    fn allocation_mut(&mut self, ptr: DevicePtr) -> Result<&mut Vec<u8>> {
        self.allocations
            .get_mut(&ptr.addr())
            .ok_or_else(|| RuntimeError::Execution(format!("Unknown device address {ptr}")))
    }
}

#[derive(Debug)]
struct HostMemory {
    cap: Option<usize>,
    state: Mutex<MemoryState>,
}

/// Accelerator that runs plans on the CPU.
#[derive(Debug, Clone)]
pub struct HostAccelerator {
    memory: Arc<HostMemory>,
}

impl HostAccelerator {
    /// Simulated device with unlimited memory.
    pub fn new() -> Self {
        Self::with_cap(None)
    }

    /// Simulated device that refuses allocations beyond `bytes` in total.
    pub fn with_memory_cap(bytes: usize) -> Self {
        Self::with_cap(Some(bytes))
    }

    fn with_cap(cap: Option<usize>) -> Self {
        Self {
            memory: Arc::new(HostMemory {
                cap,
                state: Mutex::new(MemoryState {
                    allocations: HashMap::new(),
                    next_addr: BASE_ADDR,
                    stats: DeviceStats::default(),
                }),
            }),
        }
    }

    pub fn memory_cap(&self) -> Option<usize> {
        self.memory.cap
    }

    /// Snapshot of the device counters.
    pub fn stats(&self) -> DeviceStats {
        self.memory.state.lock().stats
    }
}

impl Default for HostAccelerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Accelerator for HostAccelerator {
    fn name(&self) -> &str {
        "host"
    }

    fn deserialize_plan(&self, blob: &[u8]) -> Result<Box<dyn PlanEngine>> {
        let decoded = statica_plan::decode(blob).map_err(LoadError::from)?;
        decoded
            .header
            .check_runtime(RUNTIME_VERSION)
            .map_err(LoadError::from)?;

        tracing::debug!(
            name = %decoded.program.name,
            layers = decoded.program.layers.len(),
            "Deserialized plan for host device"
        );

        Ok(Box::new(HostPlanEngine {
            program: Arc::new(decoded.program),
            memory: Arc::clone(&self.memory),
        }))
    }

    fn alloc_device(&self, bytes: usize) -> Result<DevicePtr> {
        if bytes == 0 {
            return Err(RuntimeError::Allocation(
                "zero-sized device allocation".to_string(),
            ));
        }

        let mut state = self.memory.state.lock();
        if let Some(cap) = self.memory.cap
            && state.stats.live_bytes.saturating_add(bytes) > cap
        {
            return Err(RuntimeError::Allocation(format!(
                "out of device memory: {bytes} bytes requested, {} of {cap} bytes in use",
                state.stats.live_bytes
            )));
        }

        let mut data = Vec::new();
        data.try_reserve_exact(bytes).map_err(|e| {
            RuntimeError::Allocation(format!("device allocation of {bytes} bytes: {e}"))
        })?;
        data.resize(bytes, 0u8);

        let addr = state.next_addr;
        state.next_addr += (bytes as u64).div_ceil(ALIGNMENT) * ALIGNMENT;
        state.allocations.insert(addr, data);
        state.stats.live_allocations += 1;
        state.stats.live_bytes += bytes;
        state.stats.allocs += 1;

        let ptr = DevicePtr::from_raw(addr);
        tracing::trace!(%ptr, bytes, "Allocated device memory");
        Ok(ptr)
    }

    fn free_device(&self, ptr: DevicePtr) -> Result<()> {
        let mut state = self.memory.state.lock();
        let data = state.allocations.remove(&ptr.addr()).ok_or_else(|| {
            RuntimeError::Execution(format!(
                "Free of unknown or already freed device address {ptr}"
            ))
        })?;
        state.stats.live_allocations -= 1;
        state.stats.live_bytes -= data.len();
        state.stats.frees += 1;

        tracing::trace!(%ptr, bytes = data.len(), "Freed device memory");
        Ok(())
    }

    fn copy_to_device(&self, dst: DevicePtr, src: &[u8]) -> Result<()> {
        let mut state = self.memory.state.lock();
        let data = state.allocation_mut(dst)?;
        if src.len() > data.len() {
            return Err(RuntimeError::Execution(format!(
                "Upload of {} bytes exceeds allocation {dst} of {} bytes",
                src.len(),
                data.len()
            )));
        }
        data[..src.len()].copy_from_slice(src);
        state.stats.uploads += 1;
        Ok(())
    }

    fn copy_to_host(&self, dst: &mut [u8], src: DevicePtr) -> Result<()> {
        let mut state = self.memory.state.lock();
        let data = state.allocation(src)?;
        if dst.len() > data.len() {
            return Err(RuntimeError::Execution(format!(
                "Download of {} bytes exceeds allocation {src} of {} bytes",
                dst.len(),
                data.len()
            )));
        }
        dst.copy_from_slice(&data[..dst.len()]);
        state.stats.downloads += 1;
        Ok(())
    }
}

struct HostPlanEngine {
    program: Arc<Program>,
    memory: Arc<HostMemory>,
}

impl PlanEngine for HostPlanEngine {
    fn name(&self) -> &str {
        &self.program.name
    }

    fn create_context(&self) -> Result<Box<dyn ExecutionContext>> {
        Ok(Box::new(HostContext {
            program: Arc::clone(&self.program),
            memory: Arc::clone(&self.memory),
        }))
    }
}

struct HostContext {
    program: Arc<Program>,
    memory: Arc<HostMemory>,
}

impl ExecutionContext for HostContext {
    fn execute(&mut self, bindings: &Bindings) -> Result<()> {
        let input_bytes = self.program.input_volume() * size_of::<f32>();
        let output_bytes = self.program.output_volume() * size_of::<f32>();

        let mut activation: Vec<f32> = {
            let state = self.memory.state.lock();
            let data = state.allocation(bindings[INPUT_BINDING])?;
            if data.len() < input_bytes {
                return Err(RuntimeError::Execution(format!(
                    "Input binding holds {} bytes, plan reads {input_bytes}",
                    data.len()
                )));
            }
            bytemuck::pod_collect_to_vec(&data[..input_bytes])
        };

        for layer in &self.program.layers {
            activation = kernels::run_layer(layer, &activation);
        }

        let mut state = self.memory.state.lock();
        let data = state.allocation_mut(bindings[OUTPUT_BINDING])?;
        if data.len() < output_bytes {
            return Err(RuntimeError::Execution(format!(
                "Output binding holds {} bytes, plan writes {output_bytes}",
                data.len()
            )));
        }
        data[..output_bytes].copy_from_slice(bytemuck::cast_slice(&activation));
        state.stats.executions += 1;
        Ok(())
    }
}
