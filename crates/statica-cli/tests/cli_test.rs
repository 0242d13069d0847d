//! End-to-end tests for the CLI library: synthetic plans, classification,
//! benchmarking and inspection on the host accelerator.

use image::{ImageFormat, Rgb, RgbImage};
use statica_cli::synth::{PlanKind, write_plan};
use statica_core::EngineConfig;
use statica_runtime::HostAccelerator;
use std::path::Path;
use std::sync::Arc;

fn write_image(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("input.png");
    let mut image = RgbImage::new(300, 260);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        *pixel = Rgb([(x % 256) as u8, (y % 256) as u8, 90]);
    }
    image.save_with_format(&path, ImageFormat::Png).unwrap();
    path
}

fn config_in(dir: &Path, kind: PlanKind) -> EngineConfig {
    let config = EngineConfig::default();
    let plan = dir.join("model").join("test.plan");
    write_plan(kind, &config.input_shape, &config.output_shape, 7, &plan).unwrap();
    config
        .with_plan_path(plan)
        .with_image_path(write_image(dir))
}

#[test]
fn test_classify_with_identity_plan() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), PlanKind::Identity);
    let accel = HostAccelerator::new();

    let top = statica_cli::run::classify_image(&config, Arc::new(accel.clone())).unwrap();

    assert!(top.index < 1000);
    assert!(top.probability > 0.0 && top.probability <= 1.0);
    assert_eq!(accel.stats().live_allocations, 0);
}

#[test]
fn test_classify_pool_dense_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), PlanKind::PoolDense);

    let first =
        statica_cli::run::classify_image(&config, Arc::new(HostAccelerator::new())).unwrap();
    let second =
        statica_cli::run::classify_image(&config, Arc::new(HostAccelerator::new())).unwrap();

    assert_eq!(first.index, second.index);
    assert_eq!(first.score, second.score);
    // Softmax output is a probability vector, so the score is a probability.
    assert!(first.score > 0.0 && first.score <= 1.0);
}

#[test]
fn test_missing_image_releases_resources() {
    let dir = tempfile::tempdir().unwrap();
    let config =
        config_in(dir.path(), PlanKind::Identity).with_image_path(dir.path().join("missing.jpg"));
    let accel = HostAccelerator::new();

    let err = statica_cli::run::classify_image(&config, Arc::new(accel.clone())).unwrap_err();
    assert!(format!("{err:#}").contains("missing.jpg"));

    let stats = accel.stats();
    assert_eq!(stats.allocs, 2);
    assert_eq!(stats.frees, 2);
    assert_eq!(stats.live_allocations, 0);
    assert_eq!(stats.executions, 0);
}

#[test]
fn test_missing_plan_fails_before_allocating() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::default()
        .with_plan_path(dir.path().join("absent.plan"))
        .with_image_path(write_image(dir.path()));
    let accel = HostAccelerator::new();

    let err = statica_cli::run::classify_image(&config, Arc::new(accel.clone())).unwrap_err();
    assert!(format!("{err:#}").contains("absent.plan"));
    assert_eq!(accel.stats().allocs, 0);
}

#[test]
fn test_written_plan_decodes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("dir").join("pd.plan");
    let config = EngineConfig::default();

    let program = write_plan(
        PlanKind::PoolDense,
        &config.input_shape,
        &config.output_shape,
        3,
        &path,
    )
    .unwrap();

    let decoded = statica_plan::decode(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(decoded.program, program);
    assert_eq!(decoded.program.input_shape, config.input_shape);
    assert_eq!(decoded.program.output_shape, config.output_shape);
}

#[test]
fn test_bench_report() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), PlanKind::PoolDense);
    let accel = HostAccelerator::new();

    let report = statica_cli::bench::bench(&config, Arc::new(accel.clone()), 3, 1).unwrap();

    assert_eq!(report.iterations, 3);
    assert!(report.min <= report.mean);
    assert!(report.mean <= report.max);
    assert!(report.top.is_some());

    let stats = accel.stats();
    assert_eq!(stats.executions, 4);
    assert_eq!(stats.live_allocations, 0);
}

#[test]
fn test_inspect_plan_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), PlanKind::PoolDense);

    let text = statica_cli::inspect::describe_plan_file(&config.plan_path).unwrap();

    assert!(text.starts_with("Plan: pool_dense_classifier\n"));
    assert!(text.contains("[0] global_avg_pool"));
    assert!(text.contains("[1] dense"));
    assert!(text.contains("3x1000"));
    assert!(text.contains("[2] softmax"));
}
