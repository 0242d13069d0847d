//! Common test utilities for runtime integration tests.
//!
//! Helpers to write synthetic plans to disk, build matching configurations
//! and generate deterministic inputs.

#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statica_core::{EngineConfig, Shape, Tensor};
use statica_plan::Program;
use std::io::Write;

/// Install a test subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Write an encoded program to a temporary plan file.
pub fn write_plan(program: &Program) -> tempfile::NamedTempFile {
    write_plan_bytes(&program.encode())
}

/// Write arbitrary bytes to a temporary plan file.
pub fn write_plan_bytes(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".plan")
        .tempfile()
        .unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

/// Configuration for the program's shapes, pointing at `plan`.
pub fn config_for(program: &Program, plan: &tempfile::NamedTempFile) -> EngineConfig {
    EngineConfig::default()
        .with_shapes(program.input_shape.clone(), program.output_shape.clone())
        .with_plan_path(plan.path())
}

/// Uniform random `f32` tensor in `[-1, 1)`.
pub fn random_input(shape: impl Into<Shape>, seed: u64) -> Tensor {
    let shape = shape.into();
    let mut rng = StdRng::seed_from_u64(seed);
    let data: Vec<f32> = (0..shape.volume())
        .map(|_| rng.gen_range(-1.0f32..1.0))
        .collect();
    Tensor::from_vec(data, shape).unwrap()
}

/// Assert `actual` matches `expected` within `rel_tol`, relative to
/// `max(|expected|, 1)`.
pub fn assert_close(actual: &[f32], expected: &[f32], rel_tol: f32) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        let scale = e.abs().max(1.0);
        assert!(
            (a - e).abs() / scale <= rel_tol,
            "index {i}: got {a}, expected {e} (tolerance {rel_tol})"
        );
    }
}
