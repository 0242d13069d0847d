//! Immutable engine configuration.
//!
//! Every component receives the pieces of `EngineConfig` it needs at
//! construction time. Nothing here is negotiated with the plan at runtime.

use crate::types::{DataType, Shape};
use crate::{CoreError, Result};
use std::path::{Path, PathBuf};

/// ImageNet channel means (RGB), matching the values the plan was built with.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations (RGB).
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Preprocessing constants shared by every backend.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessConfig {
    /// Intermediate (width, height) the decoded image is resized to.
    pub resize: (u32, u32),
    /// Final (width, height) center crop fed to the model.
    pub crop: (u32, u32),
    /// Per-channel mean, RGB order.
    pub mean: [f32; 3],
    /// Per-channel standard deviation, RGB order.
    pub std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            resize: (256, 256),
            crop: (224, 224),
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }
}

/// Configuration for one inference engine instance.
///
/// `Default` is the fixed ResNet-50 classification contract: input
/// `(1, 3, 224, 224)` float32, output `(1, 1000)`.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub input_shape: Shape,
    pub output_shape: Shape,
    pub input_dtype: DataType,
    pub preprocess: PreprocessConfig,
    pub plan_path: PathBuf,
    pub image_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            input_shape: Shape::from([1, 3, 224, 224]),
            output_shape: Shape::from([1, 1000]),
            input_dtype: DataType::F32,
            preprocess: PreprocessConfig::default(),
            plan_path: PathBuf::from("./model/resnet50_fp16.plan"),
            image_path: PathBuf::from("./input/dog.jpg"),
        }
    }
}

impl EngineConfig {
    pub fn with_plan_path(mut self, path: impl AsRef<Path>) -> Self {
        self.plan_path = path.as_ref().to_path_buf();
        self
    }

    pub fn with_image_path(mut self, path: impl AsRef<Path>) -> Self {
        self.image_path = path.as_ref().to_path_buf();
        self
    }

    /// Use different fixed shapes, e.g. a small model in tests.
    ///
    /// The preprocessing crop follows the input's spatial dimensions.
    pub fn with_shapes(mut self, input: impl Into<Shape>, output: impl Into<Shape>) -> Self {
        self.input_shape = input.into();
        self.output_shape = output.into();
        if let [_, _, h, w] = self.input_shape.dims() {
            self.preprocess.crop = (*w as u32, *h as u32);
        }
        self
    }

    pub fn with_preprocess(mut self, preprocess: PreprocessConfig) -> Self {
        self.preprocess = preprocess;
        self
    }

    /// Number of input elements.
    pub fn input_volume(&self) -> usize {
        self.input_shape.volume()
    }

    /// Number of output elements.
    pub fn output_volume(&self) -> usize {
        self.output_shape.volume()
    }

    /// Check the configuration is internally consistent.
    pub fn validate(&self) -> Result<()> {
        let dims = self.input_shape.dims();
        let [batch, channels, height, width] = dims else {
            return Err(CoreError::Config(format!(
                "Input shape must be NCHW, got {}",
                self.input_shape
            )));
        };
        if *batch != 1 {
            return Err(CoreError::Config(format!("Batch size must be 1, got {batch}")));
        }
        if *channels != 3 {
            return Err(CoreError::Config(format!(
                "Input must have 3 (RGB) channels, got {channels}"
            )));
        }
        for shape in [&self.input_shape, &self.output_shape] {
            match shape.checked_volume() {
                Some(0) => {
                    return Err(CoreError::Config(format!("Shape {shape} is empty")));
                }
                None => {
                    return Err(CoreError::Config(format!(
                        "Shape {shape} overflows element count"
                    )));
                }
                Some(_) => {}
            }
        }
        if self.input_dtype != DataType::F32 {
            return Err(CoreError::Config(format!(
                "Input element type must be float32, got {}",
                self.input_dtype
            )));
        }

        let pre = &self.preprocess;
        if (pre.crop.0 as usize, pre.crop.1 as usize) != (*width, *height) {
            return Err(CoreError::Config(format!(
                "Crop {}x{} doesn't match input spatial size {}x{}",
                pre.crop.0, pre.crop.1, width, height
            )));
        }
        if pre.crop.0 > pre.resize.0 || pre.crop.1 > pre.resize.1 {
            return Err(CoreError::Config(format!(
                "Crop {}x{} is larger than resize {}x{}",
                pre.crop.0, pre.crop.1, pre.resize.0, pre.resize.1
            )));
        }
        if pre.std.iter().any(|s| !(*s > 0.0)) {
            return Err(CoreError::Config(format!("Std must be positive, got {:?}", pre.std)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_resnet50_contract() {
        let config = EngineConfig::default();
        assert_eq!(config.input_shape, Shape::from([1, 3, 224, 224]));
        assert_eq!(config.output_shape, Shape::from([1, 1000]));
        assert_eq!(config.input_volume(), 150_528);
        assert_eq!(config.output_volume(), 1000);
        config.validate().unwrap();
    }

    #[test]
    fn test_with_shapes_updates_crop() {
        let config = EngineConfig::default()
            .with_shapes([1, 3, 8, 8], [1, 10])
            .with_preprocess(PreprocessConfig {
                resize: (10, 10),
                crop: (8, 8),
                ..PreprocessConfig::default()
            });
        assert_eq!(config.preprocess.crop, (8, 8));
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_batch() {
        let config = EngineConfig::default().with_shapes([2, 3, 224, 224], [2, 1000]);
        assert!(config.validate().unwrap_err().to_string().contains("Batch"));
    }

    #[test]
    fn test_validate_rejects_overflowing_output() {
        let config = EngineConfig::default().with_shapes([1, 3, 224, 224], [1 << 40, 1 << 40]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("overflows"));
    }

    #[test]
    fn test_validate_rejects_oversized_crop() {
        let mut config = EngineConfig::default();
        config.preprocess.resize = (200, 200);
        assert!(config.validate().is_err());
    }
}
