//! Core types shared by every statica crate.
//!
//! This crate holds the pieces that the plan container, the preprocessing
//! pipeline and the runtime all agree on:
//! - Element types and fixed shapes (`DataType`, `Shape`)
//! - The CPU-side `Tensor` used for inputs and outputs
//! - The immutable `EngineConfig` passed to each component at construction
//! - Top-1 interpretation of a score vector (`Classification`)

pub mod classify;
pub mod config;
pub mod tensor;
pub mod types;

pub use classify::Classification;
pub use config::{EngineConfig, PreprocessConfig};
pub use tensor::Tensor;
pub use types::{DataType, Element, Shape};

/// Result type using the crate's error type.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid tensor: {0}")]
    Tensor(String),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: DataType, actual: DataType },

    #[error("Invalid configuration: {0}")]
    Config(String),
}
