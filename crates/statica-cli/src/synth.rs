//! Synthetic plan generation for demos and tests.

use anyhow::{Context, Result};
use statica_core::Shape;
use statica_plan::{PlanBuilder, Program};
use std::path::Path;

/// Kind of synthetic plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PlanKind {
    /// Output is the first output-volume input values
    Identity,
    /// Global average pool, dense layer with random weights, softmax
    PoolDense,
}

/// Build a synthetic program for the given shapes.
pub fn build_plan(kind: PlanKind, input: &Shape, output: &Shape, seed: u64) -> Result<Program> {
    let program = match kind {
        PlanKind::Identity => PlanBuilder::identity(input.clone(), output.clone()),
        PlanKind::PoolDense => PlanBuilder::pool_dense_classifier(input.clone(), output.clone(), seed),
    };
    program.with_context(|| format!("Failed to build {kind:?} plan for {input} -> {output}"))
}

/// Build a synthetic plan and write it to `path`.
pub fn write_plan(
    kind: PlanKind,
    input: &Shape,
    output: &Shape,
    seed: u64,
    path: &Path,
) -> Result<Program> {
    let program = build_plan(kind, input, output, seed)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, program.encode())
        .with_context(|| format!("Failed to write plan to {}", path.display()))?;

    tracing::info!(path = %path.display(), name = %program.name, "Wrote synthetic plan");
    Ok(program)
}
