//! Synchronous inference engine and resource lifecycle.

use crate::device::{Accelerator, HostBuffer, INPUT_BINDING, OUTPUT_BINDING};
use crate::error::{Result, RuntimeError};
use crate::loader::{CompiledExecutionPlan, ExecutionHandle, PlanLoader};
use crate::memory::{BufferSet, MemoryAllocator};
use statica_core::{Classification, DataType, EngineConfig, Shape, Tensor};
use std::sync::Arc;
use std::time::Instant;

/// Counters of the steps `infer` performed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InferenceStats {
    /// Calls to `infer`, including rejected ones.
    pub calls: u64,
    /// Input copies into the host staging buffer.
    pub staged: u64,
    /// Host to device copies.
    pub uploads: u64,
    /// Plan executions.
    pub executions: u64,
    /// Device to host copies.
    pub downloads: u64,
}

/// Result of one inference, borrowed from the engine's output buffer.
///
/// The storage is reused by the next `infer` call; use `to_tensor` to keep
/// the values.
#[derive(Debug, Clone, Copy)]
pub struct OutputView<'a> {
    data: &'a [f32],
    shape: &'a Shape,
}

impl<'a> OutputView<'a> {
    pub fn shape(&self) -> &'a Shape {
        self.shape
    }

    pub fn as_slice(&self) -> &'a [f32] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Top-1 class of the output scores.
    pub fn classify(&self) -> Option<Classification> {
        Classification::from_scores(self.data)
    }

    /// Copy the output into an owned tensor.
    pub fn to_tensor(&self) -> Result<Tensor> {
        Tensor::from_vec(self.data.to_vec(), self.shape.clone())
            .map_err(|e| RuntimeError::Execution(format!("Output doesn't fit its shape: {e}")))
    }
}

/// Fixed-shape synchronous inference engine.
///
/// Owns the loaded plan, its execution handle and the host/device buffer
/// pairs. One `infer` call runs at a time: it takes `&mut self`.
///
/// Construction is staged so a failure between loading and allocating
/// leaves an engine that can still be released:
///
/// ```no_run
/// # use std::sync::Arc;
/// # use statica_core::EngineConfig;
/// # use statica_runtime::{HostAccelerator, InferenceEngine};
/// # fn main() -> statica_runtime::Result<()> {
/// let mut engine = InferenceEngine::load(EngineConfig::default(), Arc::new(HostAccelerator::new()))?;
/// if let Err(e) = engine.allocate() {
///     engine.release();
///     return Err(e);
/// }
/// # Ok(())
/// # }
/// ```
pub struct InferenceEngine {
    config: EngineConfig,
    accelerator: Arc<dyn Accelerator>,
    plan: Option<CompiledExecutionPlan>,
    handle: Option<ExecutionHandle>,
    buffers: Option<BufferSet>,
    stats: InferenceStats,
}

impl InferenceEngine {
    /// Load the plan and create its handle, then allocate buffers.
    pub fn new(config: EngineConfig, accelerator: Arc<dyn Accelerator>) -> Result<Self> {
        let mut engine = Self::load(config, accelerator)?;
        engine.allocate()?;
        Ok(engine)
    }

    /// Load the plan at `config.plan_path` and create its execution handle.
    ///
    /// No buffers are allocated yet; call `allocate` before `infer`.
    #[tracing::instrument(skip_all, fields(plan = %config.plan_path.display()))]
    pub fn load(config: EngineConfig, accelerator: Arc<dyn Accelerator>) -> Result<Self> {
        config.validate()?;

        let plan = PlanLoader::new(Arc::clone(&accelerator)).load(&config.plan_path)?;
        let handle = plan.create_handle()?;

        Ok(Self {
            config,
            accelerator,
            plan: Some(plan),
            handle: Some(handle),
            buffers: None,
            stats: InferenceStats::default(),
        })
    }

    /// Allocate the host/device buffer pairs from the configured shapes.
    ///
    /// Does nothing if buffers are already allocated.
    pub fn allocate(&mut self) -> Result<()> {
        if self.buffers.is_some() {
            return Ok(());
        }
        if self.plan.is_none() {
            return Err(RuntimeError::Execution(
                "cannot allocate buffers for a released engine".to_string(),
            ));
        }

        let allocator = MemoryAllocator::new(Arc::clone(&self.accelerator));
        let buffers = allocator
            .allocate(self.config.input_volume(), self.config.output_volume())
            .inspect_err(|e| tracing::error!("Buffer allocation failed: {e}"))?;
        self.buffers = Some(buffers);
        Ok(())
    }

    /// Run one inference.
    ///
    /// The input must have exactly the configured input shape and be
    /// `float32`; anything else fails with `ShapeMismatch` before any
    /// buffer is touched.
    ///
    /// # Errors
    /// - `ShapeMismatch` for a wrong shape or element type
    /// - `Execution` if buffers aren't allocated or an accelerator call fails
    pub fn infer(&mut self, input: &Tensor) -> Result<OutputView<'_>> {
        self.stats.calls += 1;
        let _span = tracing::debug_span!("infer", call = self.stats.calls).entered();

        if *input.shape() != self.config.input_shape || input.dtype() != self.config.input_dtype {
            return Err(RuntimeError::ShapeMismatch {
                expected: self.config.input_shape.clone(),
                expected_dtype: self.config.input_dtype,
                actual: input.shape().clone(),
                actual_dtype: input.dtype(),
            });
        }

        let (Some(buffers), Some(handle)) = (self.buffers.as_mut(), self.handle.as_mut()) else {
            return Err(RuntimeError::Execution(
                "engine has no buffers; it was never allocated or has been released".to_string(),
            ));
        };
        let bindings = buffers.bindings()?;
        let start = Instant::now();

        stage(&mut buffers.host_in, input)?;
        self.stats.staged += 1;

        self.accelerator
            .copy_to_device(bindings[INPUT_BINDING], buffers.host_in.as_bytes())?;
        self.stats.uploads += 1;

        handle.execute(&bindings)?;
        self.stats.executions += 1;

        self.accelerator
            .copy_to_host(buffers.host_out.as_bytes_mut(), bindings[OUTPUT_BINDING])?;
        self.stats.downloads += 1;

        tracing::debug!(latency_us = start.elapsed().as_micros() as u64, "Inference complete");

        Ok(OutputView {
            data: buffers.host_out.as_slice(),
            shape: &self.config.output_shape,
        })
    }

    /// Release buffers, handle and plan, in that order.
    ///
    /// Safe to call at any point, including after a failed `allocate`, and
    /// any number of times.
    pub fn release(&mut self) {
        let mut released = false;

        if let Some(mut buffers) = self.buffers.take() {
            if let Err(e) = buffers.release() {
                tracing::warn!("Error while freeing device buffers: {e}");
            }
            released = true;
        }
        if let Some(handle) = self.handle.take() {
            drop(handle);
            released = true;
        }
        if let Some(plan) = self.plan.take() {
            tracing::debug!(plan = plan.name(), "Released plan");
            released = true;
        }

        if released {
            tracing::info!("Released inference resources");
        }
    }

    /// Whether `release` has run.
    pub fn is_released(&self) -> bool {
        self.plan.is_none()
    }

    pub fn has_buffers(&self) -> bool {
        self.buffers.is_some()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> InferenceStats {
        self.stats
    }

    /// The loaded plan, until released.
    pub fn plan(&self) -> Option<&CompiledExecutionPlan> {
        self.plan.as_ref()
    }

    pub fn accelerator(&self) -> &Arc<dyn Accelerator> {
        &self.accelerator
    }
}

impl std::fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("accelerator", &self.accelerator.name())
            .field("plan", &self.plan)
            .field("has_handle", &self.handle.is_some())
            .field("buffers", &self.buffers)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Drop for InferenceEngine {
    fn drop(&mut self) {
        self.release();
    }
}

/// Copy the tensor's row-major contents into the host staging buffer.
fn stage(host: &mut HostBuffer, input: &Tensor) -> Result<()> {
    debug_assert_eq!(input.dtype(), DataType::F32);
    let src = input.as_bytes();
    let dst = host.as_bytes_mut();
    if src.len() != dst.len() {
        return Err(RuntimeError::Execution(format!(
            "input of {} bytes doesn't fit staging buffer of {} bytes",
            src.len(),
            dst.len()
        )));
    }
    dst.copy_from_slice(src);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HostAccelerator;
    use statica_plan::PlanBuilder;
    use std::io::Write;

    fn small_config(file: &tempfile::NamedTempFile) -> EngineConfig {
        EngineConfig::default()
            .with_shapes([1, 3, 4, 4], [1, 10])
            .with_plan_path(file.path())
    }

    fn identity_plan() -> tempfile::NamedTempFile {
        let program = PlanBuilder::identity([1, 3, 4, 4], [1, 10]).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&program.encode()).unwrap();
        file
    }

    #[test]
    fn test_infer_counts_every_step() {
        let file = identity_plan();
        let mut engine =
            InferenceEngine::new(small_config(&file), Arc::new(HostAccelerator::new())).unwrap();

        let input = Tensor::full(1.5f32, [1, 3, 4, 4]);
        let output = engine.infer(&input).unwrap();
        assert_eq!(output.shape().dims(), &[1, 10]);
        assert_eq!(output.as_slice(), &[1.5; 10]);

        let stats = engine.stats();
        assert_eq!(
            stats,
            InferenceStats {
                calls: 1,
                staged: 1,
                uploads: 1,
                executions: 1,
                downloads: 1,
            }
        );
    }

    #[test]
    fn test_dtype_mismatch() {
        let file = identity_plan();
        let mut engine =
            InferenceEngine::new(small_config(&file), Arc::new(HostAccelerator::new())).unwrap();

        let input = Tensor::full(1i32, [1, 3, 4, 4]);
        let err = engine.infer(&input).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::ShapeMismatch {
                actual_dtype: DataType::I32,
                ..
            }
        ));
        assert_eq!(engine.stats().staged, 0);
    }

    #[test]
    fn test_infer_without_buffers() {
        let file = identity_plan();
        let mut engine =
            InferenceEngine::load(small_config(&file), Arc::new(HostAccelerator::new())).unwrap();
        assert!(!engine.has_buffers());

        let err = engine.infer(&Tensor::full(0.0f32, [1, 3, 4, 4])).unwrap_err();
        assert!(matches!(err, RuntimeError::Execution(_)));
    }

    #[test]
    fn test_invalid_config_rejected_before_load() {
        let file = identity_plan();
        let config = small_config(&file).with_shapes([2, 3, 4, 4], [2, 10]);
        let err = InferenceEngine::load(config, Arc::new(HostAccelerator::new())).err().unwrap();
        assert!(matches!(err, RuntimeError::Config(_)));
    }

    #[test]
    fn test_allocate_after_release_fails() {
        let file = identity_plan();
        let mut engine =
            InferenceEngine::new(small_config(&file), Arc::new(HostAccelerator::new())).unwrap();
        engine.release();
        assert!(engine.is_released());
        assert!(engine.allocate().is_err());
    }

    #[test]
    fn test_output_view_to_tensor() {
        let file = identity_plan();
        let mut engine =
            InferenceEngine::new(small_config(&file), Arc::new(HostAccelerator::new())).unwrap();

        let values: Vec<f32> = (0..48).map(|i| i as f32).collect();
        let input = Tensor::from_vec(values, [1, 3, 4, 4]).unwrap();
        let tensor = engine.infer(&input).unwrap().to_tensor().unwrap();

        assert_eq!(tensor.shape().dims(), &[1, 10]);
        assert_eq!(tensor.to_vec::<f32>().unwrap()[9], 9.0);
    }

    #[test]
    fn test_output_view_size_mismatch_is_execution_error() {
        let shape = Shape::from([1, 10]);
        let data = [0.0f32; 4];
        let view = OutputView {
            data: &data,
            shape: &shape,
        };
        let err = view.to_tensor().unwrap_err();
        assert!(matches!(err, RuntimeError::Execution(_)), "{err}");
    }
}
