//! WGSL kernels for plan layers and their compilation through naga_oil.

use crate::error::{Result, RuntimeError};
use naga_oil::compose::{Composer, NagaModuleDescriptor, ShaderDefValue};
use statica_plan::Layer;
use std::collections::HashMap;

/// Invocations per workgroup for the element-parallel kernels.
pub(crate) const WORKGROUP_SIZE: u32 = 64;

/// Shader definitions substituted into a kernel source.
pub(crate) type ShaderDefs = HashMap<String, ShaderDefValue>;

/// Get the raw WGSL source of a kernel.
pub(crate) fn get_shader_source(name: &str) -> Option<&'static str> {
    match name {
        "take" => Some(include_str!("../../shaders/take.wgsl")),
        "global_avg_pool" => Some(include_str!("../../shaders/global_avg_pool.wgsl")),
        "dense" => Some(include_str!("../../shaders/dense.wgsl")),
        "relu" => Some(include_str!("../../shaders/relu.wgsl")),
        "softmax" => Some(include_str!("../../shaders/softmax.wgsl")),
        _ => None,
    }
}

/// Fixed dimensions of a layer as shader defs.
pub(crate) fn layer_defs(layer: &Layer, input_len: usize) -> Result<ShaderDefs> {
    let mut defs = ShaderDefs::new();
    defs.insert(
        "WORKGROUP_SIZE".to_string(),
        ShaderDefValue::UInt(WORKGROUP_SIZE),
    );

    let dims: Vec<(&str, usize)> = match layer {
        Layer::Take { offset, len } => vec![("OFFSET", *offset), ("LEN", *len)],
        Layer::GlobalAvgPool { channels, spatial } => {
            vec![("CHANNELS", *channels), ("SPATIAL", *spatial)]
        }
        Layer::Dense {
            in_features,
            out_features,
            ..
        } => vec![("IN_FEATURES", *in_features), ("OUT_FEATURES", *out_features)],
        Layer::Relu | Layer::Softmax => vec![("LEN", input_len)],
    };

    for (name, value) in dims {
        let value = u32::try_from(value).map_err(|_| {
            RuntimeError::Execution(format!(
                "{} dimension {name}={value} exceeds the shader index range",
                layer.kind()
            ))
        })?;
        defs.insert(name.to_string(), ShaderDefValue::UInt(value));
    }
    Ok(defs)
}

/// Compile a kernel with its shader defs into WGSL that wgpu accepts.
///
/// naga_oil produces a naga module; it is validated and written back out
/// as WGSL so the naga version used here is independent of wgpu's.
pub(crate) fn compile(name: &str, shader_defs: ShaderDefs) -> Result<String> {
    let source = get_shader_source(name)
        .ok_or_else(|| RuntimeError::Execution(format!("Shader '{name}' not found")))?;

    let mut composer = Composer::default();
    let module = composer
        .make_naga_module(NagaModuleDescriptor {
            source,
            file_path: &format!("{name}.wgsl"),
            shader_defs,
            ..Default::default()
        })
        .map_err(|e| RuntimeError::Execution(format!("Shader '{name}' failed to compose: {e}")))?;

    let info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| RuntimeError::Execution(format!("Shader '{name}' failed validation: {e}")))?;

    naga::back::wgsl::write_string(&module, &info, naga::back::wgsl::WriterFlags::empty())
        .map_err(|e| RuntimeError::Execution(format!("Shader '{name}' WGSL generation failed: {e}")))
}
