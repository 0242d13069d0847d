//! Plan container inspection.

use anyhow::{Context, Result};
use statica_plan::Layer;
use std::fmt::Write;
use std::path::Path;

/// Human-readable description of a plan file.
pub fn describe_plan_file(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read plan {}", path.display()))?;
    describe_plan(&bytes)
}

/// Human-readable description of plan bytes: header fields, shapes and
/// layers.
pub fn describe_plan(bytes: &[u8]) -> Result<String> {
    let header = statica_plan::read_header(bytes).context("Failed to read plan header")?;
    let decoded = statica_plan::decode(bytes).context("Failed to decode plan")?;
    let program = &decoded.program;

    let mut out = String::new();
    writeln!(out, "Plan: {}", program.name)?;
    writeln!(out, "  Container version: {}", header.container_version)?;
    writeln!(out, "  Runtime version:   {}", header.runtime_version)?;
    writeln!(out, "  Body size:         {} bytes", header.body_len)?;
    writeln!(out, "  Input shape:       {}", program.input_shape)?;
    writeln!(out, "  Output shape:      {}", program.output_shape)?;
    writeln!(out, "  Layers:")?;

    let lens = program.activation_lens()?;
    for (i, (layer, len)) in program.layers.iter().zip(lens).enumerate() {
        writeln!(out, "    [{i}] {:<16} {} -> {len}", layer.kind(), describe_layer(layer))?;
    }
    Ok(out)
}

fn describe_layer(layer: &Layer) -> String {
    match layer {
        Layer::Take { offset, len } => format!("offset={offset} len={len}"),
        Layer::GlobalAvgPool { channels, spatial } => {
            format!("channels={channels} spatial={spatial}")
        }
        Layer::Dense {
            in_features,
            out_features,
            ..
        } => format!("{in_features}x{out_features}"),
        Layer::Relu | Layer::Softmax => String::new(),
    }
}
