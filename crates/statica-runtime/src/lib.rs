//! Fixed-shape synchronous inference runtime.
//!
//! Runs a pre-compiled image classification plan with one input of shape
//! `(1, 3, 224, 224)` and one output of shape `(1, 1000)`, one request at a
//! time.
//!
//! # Architecture
//!
//! 1. **Plan loading** - `PlanLoader` reads the plan file and hands it to an
//!    `Accelerator`, yielding a `CompiledExecutionPlan` and its single
//!    `ExecutionHandle`
//! 2. **Memory** - `MemoryAllocator` sizes host/device buffer pairs from the
//!    configured shapes
//! 3. **Execution** - `InferenceEngine::infer` stages, uploads, executes and
//!    downloads, strictly in order and blocking
//! 4. **Lifecycle** - `InferenceEngine::release` (and `Drop`) frees
//!    everything leaf to root, from any state
//!
//! Two accelerators are provided: `HostAccelerator`, a simulated device
//! running on the CPU, and `GpuAccelerator`, built on wgpu.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use statica_core::EngineConfig;
//! use statica_runtime::{HostAccelerator, InferenceEngine};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = EngineConfig::default();
//!     let input = statica_preprocess::preprocess(&config.image_path, &config.preprocess)?;
//!
//!     let mut engine = InferenceEngine::new(config, Arc::new(HostAccelerator::new()))?;
//!     let output = engine.infer(&input)?;
//!
//!     if let Some(top) = output.classify() {
//!         println!("class {} ({:.2}%)", top.index, top.confidence_percent());
//!     }
//!     Ok(())
//! }
//! ```

mod device;
mod engine;
mod error;
mod gpu;
mod host;
mod loader;
mod memory;
mod timing;

pub use device::{
    Accelerator, Bindings, DevicePtr, ExecutionContext, HostBuffer, INPUT_BINDING,
    OUTPUT_BINDING, PlanEngine,
};
pub use engine::{InferenceEngine, InferenceStats, OutputView};
pub use error::{LoadError, Result, RuntimeError};
pub use gpu::GpuAccelerator;
pub use host::{DeviceStats, HostAccelerator};
pub use loader::{CompiledExecutionPlan, ExecutionHandle, PlanLoader};
pub use memory::{BufferSet, DeviceBuffer, MemoryAllocator};
pub use timing::{ScopedTimer, Stopwatch, StopwatchError};
