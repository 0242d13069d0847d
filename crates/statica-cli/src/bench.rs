//! Repeated inference with latency statistics.

use anyhow::{Context, Result};
use statica_core::{Classification, EngineConfig};
use statica_runtime::{Accelerator, InferenceEngine, Stopwatch};
use std::sync::Arc;
use std::time::Duration;

/// Latency summary of a benchmark run.
#[derive(Debug, Clone)]
pub struct BenchReport {
    pub iterations: usize,
    pub min: Duration,
    pub mean: Duration,
    pub max: Duration,
    /// Top-1 result of the last iteration.
    pub top: Option<Classification>,
}

impl BenchReport {
    fn from_samples(samples: &[Duration], top: Option<Classification>) -> Self {
        let min = samples.iter().copied().min().unwrap_or_default();
        let max = samples.iter().copied().max().unwrap_or_default();
        let total: Duration = samples.iter().sum();
        let mean = match u32::try_from(samples.len()) {
            Ok(n) if n > 0 => total / n,
            _ => Duration::ZERO,
        };
        Self {
            iterations: samples.len(),
            min,
            mean,
            max,
            top,
        }
    }
}

/// Run `warmup` untimed and `iterations` timed inferences on the
/// configured image.
pub fn bench(
    config: &EngineConfig,
    accelerator: Arc<dyn Accelerator>,
    iterations: usize,
    warmup: usize,
) -> Result<BenchReport> {
    let input = statica_preprocess::preprocess(&config.image_path, &config.preprocess)
        .with_context(|| format!("Failed to read image {}", config.image_path.display()))?;

    let mut engine = InferenceEngine::new(config.clone(), accelerator).with_context(|| {
        format!("Failed to set up engine for {}", config.plan_path.display())
    })?;

    for _ in 0..warmup {
        engine.infer(&input).context("Warmup inference failed")?;
    }

    let mut samples = Vec::with_capacity(iterations);
    let mut top = None;
    let mut watch = Stopwatch::new();
    for i in 0..iterations {
        watch.reset();
        watch.start()?;
        let output = engine
            .infer(&input)
            .with_context(|| format!("Inference {i} failed"))?;
        watch.stop()?;

        samples.push(watch.elapsed());
        top = output.classify();
    }

    tracing::info!(
        iterations,
        warmup,
        executions = engine.stats().executions,
        "Benchmark complete"
    );
    engine.release();

    Ok(BenchReport::from_samples(&samples, top))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_statistics() {
        let samples = [
            Duration::from_millis(3),
            Duration::from_millis(1),
            Duration::from_millis(5),
        ];
        let report = BenchReport::from_samples(&samples, None);
        assert_eq!(report.iterations, 3);
        assert_eq!(report.min, Duration::from_millis(1));
        assert_eq!(report.mean, Duration::from_millis(3));
        assert_eq!(report.max, Duration::from_millis(5));
    }

    #[test]
    fn test_empty_report() {
        let report = BenchReport::from_samples(&[], None);
        assert_eq!(report.iterations, 0);
        assert_eq!(report.mean, Duration::ZERO);
    }
}
