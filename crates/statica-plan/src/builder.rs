//! Builder for synthetic plans.
//!
//! Real plans come from an external export step. The builder exists so that
//! tests, demos and benchmarks can produce small plans with known behavior.

use crate::Result;
use crate::layer::{Layer, Program};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statica_core::Shape;

/// Incrementally assembles a `Program`.
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    name: String,
    input_shape: Shape,
    output_shape: Shape,
    layers: Vec<Layer>,
}

impl PlanBuilder {
    pub fn new(
        name: impl Into<String>,
        input_shape: impl Into<Shape>,
        output_shape: impl Into<Shape>,
    ) -> Self {
        Self {
            name: name.into(),
            input_shape: input_shape.into(),
            output_shape: output_shape.into(),
            layers: Vec::new(),
        }
    }

    pub fn take(mut self, offset: usize, len: usize) -> Self {
        self.layers.push(Layer::Take { offset, len });
        self
    }

    pub fn global_avg_pool(mut self, channels: usize, spatial: usize) -> Self {
        self.layers.push(Layer::GlobalAvgPool { channels, spatial });
        self
    }

    pub fn dense(
        mut self,
        in_features: usize,
        out_features: usize,
        weight: Vec<f32>,
        bias: Vec<f32>,
    ) -> Self {
        self.layers.push(Layer::Dense {
            in_features,
            out_features,
            weight,
            bias,
        });
        self
    }

    pub fn relu(mut self) -> Self {
        self.layers.push(Layer::Relu);
        self
    }

    pub fn softmax(mut self) -> Self {
        self.layers.push(Layer::Softmax);
        self
    }

    /// Validate the layer chain and produce the program.
    pub fn build(self) -> Result<Program> {
        Program::new(self.name, self.input_shape, self.output_shape, self.layers)
    }

    /// Identity-like plan: the output is the first `output.volume()` input
    /// elements in row-major order.
    pub fn identity(input_shape: impl Into<Shape>, output_shape: impl Into<Shape>) -> Result<Program> {
        let output_shape = output_shape.into();
        let len = output_shape.volume();
        Self::new("identity", input_shape, output_shape).take(0, len).build()
    }

    /// Global-average-pool → dense → softmax classifier with seeded random
    /// weights.
    ///
    /// The input must be NCHW with batch 1; the output volume is the class
    /// count.
    pub fn pool_dense_classifier(
        input_shape: impl Into<Shape>,
        output_shape: impl Into<Shape>,
        seed: u64,
    ) -> Result<Program> {
        let input_shape = input_shape.into();
        let output_shape = output_shape.into();

        let (channels, spatial) = match input_shape.dims() {
            [_, c, h, w] => (*c, h * w),
            _ => (input_shape.volume(), 1),
        };
        let classes = output_shape.volume();

        let mut rng = StdRng::seed_from_u64(seed);
        let weight = (0..channels * classes)
            .map(|_| rng.gen_range(-1.0f32..1.0))
            .collect();
        let bias = (0..classes).map(|_| rng.gen_range(-0.1f32..0.1)).collect();

        Self::new("pool_dense_classifier", input_shape, output_shape)
            .global_avg_pool(channels, spatial)
            .dense(channels, classes, weight, bias)
            .softmax()
            .build()
    }
}
