//! Error types for the runtime crate.

use statica_core::{CoreError, DataType, Shape};
use statica_plan::PlanError;
use std::path::PathBuf;
use thiserror::Error;

/// Why a compiled plan couldn't be loaded.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The plan file doesn't exist or can't be read.
    #[error("Plan file {} is missing or unreadable: {source}", path.display())]
    Missing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The plan ends before its declared contents.
    #[error("Plan is truncated: {0}")]
    Truncated(String),

    /// The plan bytes are damaged or not a plan at all.
    #[error("Plan is corrupt: {0}")]
    Corrupt(String),

    /// The plan was built for a different runtime.
    #[error("Plan is incompatible with this runtime: {0}")]
    Incompatible(String),
}

impl From<PlanError> for LoadError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::Truncated { .. } => LoadError::Truncated(err.to_string()),
            e if e.is_incompatible() => LoadError::Incompatible(e.to_string()),
            e => LoadError::Corrupt(e.to_string()),
        }
    }
}

/// Runtime errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The compiled plan couldn't be loaded.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Host or device memory couldn't be obtained.
    #[error("Allocation failed: {0}")]
    Allocation(String),

    /// The caller's input doesn't match the fixed input contract.
    #[error(
        "Input shape mismatch: expected {expected} {expected_dtype}, got {actual} {actual_dtype}"
    )]
    ShapeMismatch {
        expected: Shape,
        expected_dtype: DataType,
        actual: Shape,
        actual_dtype: DataType,
    },

    /// An accelerator call failed, or the engine isn't in a runnable state.
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Accelerator initialization failed.
    #[error("Accelerator initialization failed: {0}")]
    Init(String),

    /// The engine configuration is inconsistent.
    #[error(transparent)]
    Config(#[from] CoreError),
}

impl From<PlanError> for RuntimeError {
    fn from(err: PlanError) -> Self {
        RuntimeError::Load(err.into())
    }
}

/// Specialized Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_errors_map_to_load_kinds() {
        let truncated = LoadError::from(PlanError::Truncated { needed: 24, actual: 0 });
        assert!(matches!(truncated, LoadError::Truncated(_)));

        let incompatible = LoadError::from(PlanError::IncompatibleRuntime { plan: 2, runtime: 1 });
        assert!(matches!(incompatible, LoadError::Incompatible(_)));

        let corrupt = LoadError::from(PlanError::DigestMismatch);
        assert!(matches!(corrupt, LoadError::Corrupt(_)));
    }

    #[test]
    fn test_shape_mismatch_message() {
        let err = RuntimeError::ShapeMismatch {
            expected: Shape::from([1, 3, 224, 224]),
            expected_dtype: DataType::F32,
            actual: Shape::from([1, 3, 256, 256]),
            actual_dtype: DataType::F32,
        };
        assert_eq!(
            err.to_string(),
            "Input shape mismatch: expected (1, 3, 224, 224) float32, got (1, 3, 256, 256) float32"
        );
    }
}
