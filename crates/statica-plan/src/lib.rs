//! Compiled execution plan container for statica.
//!
//! A compiled plan is produced by an external build step and is opaque to
//! the inference core. This crate owns the on-disk container so that
//! accelerator back-ends can deserialize it and tools can produce synthetic
//! plans.
//!
//! # Example
//!
//! ```
//! use statica_plan::{PlanBuilder, decode};
//!
//! # fn main() -> Result<(), statica_plan::PlanError> {
//! let program = PlanBuilder::new("tiny", [1, 3, 4, 4], [1, 3])
//!     .global_avg_pool(3, 16)
//!     .softmax()
//!     .build()?;
//!
//! let bytes = program.encode();
//! let decoded = decode(&bytes)?;
//! assert_eq!(decoded.program.name, "tiny");
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod container;
pub mod layer;
pub mod proto;

pub use builder::PlanBuilder;
pub use container::{
    CONTAINER_VERSION, DIGEST_LEN, DecodedPlan, HEADER_LEN, MAGIC, PlanHeader, decode,
    encode, read_header,
};
pub use layer::{Layer, Program};

use thiserror::Error;

/// Runtime version written into plans built by this release.
///
/// A back-end refuses plans whose header carries a different value.
pub const RUNTIME_VERSION: u32 = 1;

/// Errors that can occur when encoding or decoding a plan.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Plan is truncated: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("Bad magic bytes: not a statica plan")]
    BadMagic,

    #[error("Unsupported container version {0} (supported: {CONTAINER_VERSION})")]
    UnsupportedContainer(u32),

    #[error("Plan was built for runtime version {plan}, this runtime is version {runtime}")]
    IncompatibleRuntime { plan: u32, runtime: u32 },

    #[error("Plan body digest mismatch")]
    DigestMismatch,

    #[error("Failed to decode plan body: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Invalid plan: {0}")]
    Invalid(String),
}

impl PlanError {
    /// Whether the error means the plan was produced for another runtime.
    pub fn is_incompatible(&self) -> bool {
        matches!(
            self,
            PlanError::UnsupportedContainer(_) | PlanError::IncompatibleRuntime { .. }
        )
    }
}

/// Result type for plan operations.
pub type Result<T> = std::result::Result<T, PlanError>;
