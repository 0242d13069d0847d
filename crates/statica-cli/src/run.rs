//! Single-image classification.

use anyhow::{Context, Result};
use statica_core::{Classification, EngineConfig};
use statica_runtime::{Accelerator, InferenceEngine, ScopedTimer};
use std::sync::Arc;

/// Load the plan, classify the configured image and release everything,
/// whether or not any step failed.
pub fn classify_image(
    config: &EngineConfig,
    accelerator: Arc<dyn Accelerator>,
) -> Result<Classification> {
    let mut engine = InferenceEngine::load(config.clone(), accelerator).with_context(|| {
        format!("Failed to load plan from {}", config.plan_path.display())
    })?;

    let result = infer_image(&mut engine, config);
    engine.release();
    result
}

fn infer_image(engine: &mut InferenceEngine, config: &EngineConfig) -> Result<Classification> {
    engine.allocate().context("Failed to allocate inference buffers")?;

    let input = {
        let _timer = ScopedTimer::new("preprocess");
        statica_preprocess::preprocess(&config.image_path, &config.preprocess)
            .with_context(|| format!("Failed to read image {}", config.image_path.display()))?
    };

    let output = {
        let _timer = ScopedTimer::new("inference");
        engine.infer(&input).context("Inference failed")?
    };

    output
        .classify()
        .context("Plan produced an empty output")
}
