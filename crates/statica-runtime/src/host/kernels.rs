//! CPU implementations of plan layers.

use statica_plan::Layer;

/// Apply one layer to a flat activation vector.
///
/// The program was validated on decode, so `input` always has the length
/// the layer expects.
pub(crate) fn run_layer(layer: &Layer, input: &[f32]) -> Vec<f32> {
    match layer {
        Layer::Take { offset, len } => input[*offset..*offset + *len].to_vec(),
        Layer::GlobalAvgPool { channels, spatial } => global_avg_pool(input, *channels, *spatial),
        Layer::Dense {
            in_features,
            out_features,
            weight,
            bias,
        } => dense(input, *in_features, *out_features, weight, bias),
        Layer::Relu => input.iter().map(|&x| x.max(0.0)).collect(),
        Layer::Softmax => softmax(input),
    }
}

fn global_avg_pool(input: &[f32], channels: usize, spatial: usize) -> Vec<f32> {
    (0..channels)
        .map(|c| {
            let plane = &input[c * spatial..(c + 1) * spatial];
            plane.iter().sum::<f32>() / spatial as f32
        })
        .collect()
}

fn dense(input: &[f32], in_features: usize, out_features: usize, weight: &[f32], bias: &[f32]) -> Vec<f32> {
    (0..out_features)
        .map(|o| {
            let row = &weight[o * in_features..(o + 1) * in_features];
            row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>() + bias[o]
        })
        .collect()
}

fn softmax(input: &[f32]) -> Vec<f32> {
    let max = input.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = input.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take() {
        let out = run_layer(&Layer::Take { offset: 1, len: 2 }, &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(out, vec![2.0, 3.0]);
    }

    #[test]
    fn test_global_avg_pool() {
        let out = run_layer(
            &Layer::GlobalAvgPool { channels: 2, spatial: 2 },
            &[1.0, 3.0, 10.0, 20.0],
        );
        assert_eq!(out, vec![2.0, 15.0]);
    }

    #[test]
    fn test_dense() {
        let layer = Layer::Dense {
            in_features: 2,
            out_features: 2,
            weight: vec![1.0, 2.0, -1.0, 0.5],
            bias: vec![0.5, 0.0],
        };
        assert_eq!(run_layer(&layer, &[3.0, 4.0]), vec![11.5, -1.0]);
    }

    #[test]
    fn test_relu() {
        assert_eq!(run_layer(&Layer::Relu, &[-1.0, 0.0, 2.0]), vec![0.0, 0.0, 2.0]);
    }

    #[test]
    fn test_softmax_is_stable() {
        let out = run_layer(&Layer::Softmax, &[1000.0, 1000.0]);
        assert_eq!(out, vec![0.5, 0.5]);

        let out = run_layer(&Layer::Softmax, &[0.0, 1.0, 2.0]);
        let sum: f32 = out.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(out[2] > out[1] && out[1] > out[0]);
    }
}
