//! Validated layer program decoded from a plan body.

use crate::proto::{self, LayerProto, PlanProto, layer_proto::Kind};
use crate::{PlanError, Result};
use statica_core::Shape;

/// One layer of a compiled plan. Every layer maps a flat `f32` vector to a
/// flat `f32` vector.
#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    /// `y[i] = x[offset + i]` for `i < len`.
    Take { offset: usize, len: usize },
    /// `y[c] = mean(x[c * spatial .. (c + 1) * spatial])`.
    GlobalAvgPool { channels: usize, spatial: usize },
    /// `y = W x + b`, `W` row-major `out_features x in_features`.
    Dense {
        in_features: usize,
        out_features: usize,
        weight: Vec<f32>,
        bias: Vec<f32>,
    },
    Relu,
    Softmax,
}

impl Layer {
    /// Short lowercase name, used for labels and logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Layer::Take { .. } => "take",
            Layer::GlobalAvgPool { .. } => "global_avg_pool",
            Layer::Dense { .. } => "dense",
            Layer::Relu => "relu",
            Layer::Softmax => "softmax",
        }
    }

    /// Output length for an input of `input_len` elements.
    ///
    /// # Errors
    /// Returns `PlanError::Invalid` when the layer can't consume that input.
    pub fn output_len(&self, input_len: usize) -> Result<usize> {
        match self {
            Layer::Take { offset, len } => {
                let end = offset.checked_add(*len).ok_or_else(|| {
                    PlanError::Invalid(format!("take {offset}+{len} overflows"))
                })?;
                if *len == 0 || end > input_len {
                    return Err(PlanError::Invalid(format!(
                        "take [{offset}, {end}) out of range for input of {input_len}"
                    )));
                }
                Ok(*len)
            }
            Layer::GlobalAvgPool { channels, spatial } => {
                if *channels == 0 || *spatial == 0 || channels.checked_mul(*spatial) != Some(input_len) {
                    return Err(PlanError::Invalid(format!(
                        "global_avg_pool {channels}x{spatial} doesn't cover input of {input_len}"
                    )));
                }
                Ok(*channels)
            }
            Layer::Dense {
                in_features,
                out_features,
                weight,
                bias,
            } => {
                if *in_features != input_len || *out_features == 0 {
                    return Err(PlanError::Invalid(format!(
                        "dense {in_features}->{out_features} can't consume input of {input_len}"
                    )));
                }
                if in_features.checked_mul(*out_features) != Some(weight.len()) {
                    return Err(PlanError::Invalid(format!(
                        "dense weight has {} values, expected {}x{}",
                        weight.len(),
                        out_features,
                        in_features
                    )));
                }
                if bias.len() != *out_features {
                    return Err(PlanError::Invalid(format!(
                        "dense bias has {} values, expected {}",
                        bias.len(),
                        out_features
                    )));
                }
                Ok(*out_features)
            }
            Layer::Relu | Layer::Softmax => {
                if input_len == 0 {
                    return Err(PlanError::Invalid(format!("{} on empty input", self.kind())));
                }
                Ok(input_len)
            }
        }
    }

    fn from_proto(proto: &LayerProto) -> Result<Self> {
        let kind = proto
            .kind
            .as_ref()
            .ok_or_else(|| PlanError::Invalid("layer has no kind".to_string()))?;

        Ok(match kind {
            Kind::Take(t) => Layer::Take {
                offset: to_usize(t.offset)?,
                len: to_usize(t.len)?,
            },
            Kind::GlobalAvgPool(p) => Layer::GlobalAvgPool {
                channels: to_usize(p.channels)?,
                spatial: to_usize(p.spatial)?,
            },
            Kind::Dense(d) => Layer::Dense {
                in_features: to_usize(d.in_features)?,
                out_features: to_usize(d.out_features)?,
                weight: d.weight.clone(),
                bias: d.bias.clone(),
            },
            Kind::Relu(_) => Layer::Relu,
            Kind::Softmax(_) => Layer::Softmax,
        })
    }

    fn to_proto(&self) -> LayerProto {
        let kind = match self {
            Layer::Take { offset, len } => Kind::Take(proto::TakeProto {
                offset: *offset as u64,
                len: *len as u64,
            }),
            Layer::GlobalAvgPool { channels, spatial } => {
                Kind::GlobalAvgPool(proto::GlobalAvgPoolProto {
                    channels: *channels as u64,
                    spatial: *spatial as u64,
                })
            }
            Layer::Dense {
                in_features,
                out_features,
                weight,
                bias,
            } => Kind::Dense(proto::DenseProto {
                in_features: *in_features as u64,
                out_features: *out_features as u64,
                weight: weight.clone(),
                bias: bias.clone(),
            }),
            Layer::Relu => Kind::Relu(proto::ReluProto {}),
            Layer::Softmax => Kind::Softmax(proto::SoftmaxProto {}),
        };
        LayerProto { kind: Some(kind) }
    }
}

/// A validated sequence of layers with fixed input and output shapes.
///
/// Construction guarantees that the layer chain maps exactly
/// `input_shape.volume()` elements to `output_shape.volume()` elements.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub name: String,
    pub input_shape: Shape,
    pub output_shape: Shape,
    pub layers: Vec<Layer>,
}

impl Program {
    /// Validate a layer chain against its declared shapes.
    pub fn new(
        name: impl Into<String>,
        input_shape: Shape,
        output_shape: Shape,
        layers: Vec<Layer>,
    ) -> Result<Self> {
        let program = Self {
            name: name.into(),
            input_shape,
            output_shape,
            layers,
        };
        program.activation_lens()?;
        Ok(program)
    }

    /// Element count after each layer, in execution order.
    pub fn activation_lens(&self) -> Result<Vec<usize>> {
        let input_volume = checked_volume(&self.input_shape)?;
        let output_volume = checked_volume(&self.output_shape)?;
        if input_volume == 0 || output_volume == 0 {
            return Err(PlanError::Invalid(format!(
                "empty shapes {} -> {}",
                self.input_shape, self.output_shape
            )));
        }
        if self.layers.is_empty() {
            return Err(PlanError::Invalid("plan has no layers".to_string()));
        }

        let mut len = input_volume;
        let mut lens = Vec::with_capacity(self.layers.len());
        for (i, layer) in self.layers.iter().enumerate() {
            len = layer
                .output_len(len)
                .map_err(|e| PlanError::Invalid(format!("layer {i} ({}): {e}", layer.kind())))?;
            lens.push(len);
        }

        if len != output_volume {
            return Err(PlanError::Invalid(format!(
                "layers produce {len} elements but output shape {} holds {output_volume}",
                self.output_shape
            )));
        }
        Ok(lens)
    }

    pub fn input_volume(&self) -> usize {
        self.input_shape.volume()
    }

    pub fn output_volume(&self) -> usize {
        self.output_shape.volume()
    }

    /// Build and validate a program from its protobuf body.
    pub fn from_proto(proto: &PlanProto) -> Result<Self> {
        let input_shape = to_shape(&proto.input_shape)?;
        let output_shape = to_shape(&proto.output_shape)?;
        let layers = proto
            .layers
            .iter()
            .map(Layer::from_proto)
            .collect::<Result<Vec<_>>>()?;
        Self::new(proto.name.clone(), input_shape, output_shape, layers)
    }

    pub fn to_proto(&self) -> PlanProto {
        PlanProto {
            name: self.name.clone(),
            input_shape: self.input_shape.dims().iter().map(|&d| d as u64).collect(),
            output_shape: self.output_shape.dims().iter().map(|&d| d as u64).collect(),
            layers: self.layers.iter().map(Layer::to_proto).collect(),
        }
    }

    /// Serialize into a plan container for the current runtime version.
    pub fn encode(&self) -> Vec<u8> {
        crate::container::encode(self, crate::RUNTIME_VERSION)
    }
}

fn checked_volume(shape: &Shape) -> Result<usize> {
    shape
        .checked_volume()
        .ok_or_else(|| PlanError::Invalid(format!("shape {shape} overflows element count")))
}

fn to_usize(value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| PlanError::Invalid(format!("value {value} too large")))
}

fn to_shape(dims: &[u64]) -> Result<Shape> {
    dims.iter()
        .map(|&d| to_usize(d))
        .collect::<Result<Vec<_>>>()
        .map(Shape::new)
}
