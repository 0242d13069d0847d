//! Plan loading and execution handles.

use crate::device::{Accelerator, Bindings, ExecutionContext, PlanEngine};
use crate::error::{LoadError, Result, RuntimeError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Loads compiled plan files through an accelerator.
pub struct PlanLoader {
    accelerator: Arc<dyn Accelerator>,
}

impl PlanLoader {
    pub fn new(accelerator: Arc<dyn Accelerator>) -> Self {
        Self { accelerator }
    }

    /// Read a plan file and deserialize it for the accelerator.
    ///
    /// The plan is treated as opaque: shapes are not read back from it.
    ///
    /// # Errors
    /// Returns `RuntimeError::Load` if the file is missing, empty,
    /// truncated, corrupt or built for another runtime.
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(&self, path: impl AsRef<Path>) -> Result<CompiledExecutionPlan> {
        let path = path.as_ref();
        let result = self.load_inner(path);
        if let Err(e) = &result {
            tracing::error!(path = %path.display(), "Failed to load plan: {e}");
        }
        result
    }

    fn load_inner(&self, path: &Path) -> Result<CompiledExecutionPlan> {
        let blob = std::fs::read(path).map_err(|source| LoadError::Missing {
            path: path.to_path_buf(),
            source,
        })?;
        if blob.is_empty() {
            return Err(LoadError::Truncated("plan file is empty".to_string()).into());
        }

        let engine = self.accelerator.deserialize_plan(&blob)?;
        tracing::info!(
            name = engine.name(),
            bytes = blob.len(),
            device = self.accelerator.name(),
            "Loaded plan"
        );

        Ok(CompiledExecutionPlan {
            engine,
            path: path.to_path_buf(),
            size: blob.len(),
            handle_active: Arc::new(AtomicBool::new(false)),
        })
    }
}

/// A deserialized plan, able to create one execution handle at a time.
pub struct CompiledExecutionPlan {
    engine: Box<dyn PlanEngine>,
    path: PathBuf,
    size: usize,
    handle_active: Arc<AtomicBool>,
}

impl CompiledExecutionPlan {
    /// Name recorded in the plan.
    pub fn name(&self) -> &str {
        self.engine.name()
    }

    /// File the plan was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the plan file in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether an `ExecutionHandle` derived from this plan is alive.
    pub fn has_active_handle(&self) -> bool {
        self.handle_active.load(Ordering::Acquire)
    }

    /// Create the execution handle for this plan.
    ///
    /// # Errors
    /// Returns `RuntimeError::Execution` if a handle is already active or
    /// the accelerator can't create a context.
    pub fn create_handle(&self) -> Result<ExecutionHandle> {
        if self.handle_active.swap(true, Ordering::AcqRel) {
            return Err(RuntimeError::Execution(format!(
                "plan '{}' already has an active execution handle",
                self.name()
            )));
        }

        match self.engine.create_context() {
            Ok(context) => Ok(ExecutionHandle {
                context,
                active: Arc::clone(&self.handle_active),
            }),
            Err(e) => {
                self.handle_active.store(false, Ordering::Release);
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for CompiledExecutionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledExecutionPlan")
            .field("name", &self.name())
            .field("path", &self.path)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Executes a plan against a binding pair. Dropping it frees the handle
/// slot of its plan.
pub struct ExecutionHandle {
    context: Box<dyn ExecutionContext>,
    active: Arc<AtomicBool>,
}

impl ExecutionHandle {
    /// Run the plan; blocks until the accelerator is done.
    pub fn execute(&mut self, bindings: &Bindings) -> Result<()> {
        self.context.execute(bindings)
    }
}

impl Drop for ExecutionHandle {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}
