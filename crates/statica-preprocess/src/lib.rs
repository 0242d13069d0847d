//! Image preprocessing for statica.
//!
//! Turns a raster image into the canonical `(1, 3, H, W)` float32 input
//! tensor:
//! 1. Decode and convert to RGB
//! 2. Resize to the intermediate size (bilinear, aspect ratio not kept)
//! 3. Center-crop to the model's spatial size
//! 4. Scale to `[0, 1]` and normalize per channel with mean/std
//! 5. Lay out as NCHW
//!
//! The same pipeline feeds every inference backend; any change here
//! breaks comparability between them.

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use statica_core::{PreprocessConfig, Tensor};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while reading or transforming the source image.
#[derive(Debug, Error)]
pub enum ImageReadError {
    #[error("Failed to read image {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Invalid preprocessing configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for preprocessing.
pub type Result<T> = std::result::Result<T, ImageReadError>;

/// Filter used for the intermediate resize.
const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// Read an image file and produce the model input tensor.
#[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn preprocess(path: impl AsRef<Path>, config: &PreprocessConfig) -> Result<Tensor> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| ImageReadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let image = image::load_from_memory(&bytes).map_err(|source| ImageReadError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    preprocess_image(&image, config)
}

/// Preprocess an encoded image held in memory.
pub fn preprocess_bytes(bytes: &[u8], config: &PreprocessConfig) -> Result<Tensor> {
    let image = image::load_from_memory(bytes).map_err(|source| ImageReadError::Decode {
        path: PathBuf::from("<memory>"),
        source,
    })?;
    preprocess_image(&image, config)
}

/// Preprocess an already decoded image.
pub fn preprocess_image(image: &DynamicImage, config: &PreprocessConfig) -> Result<Tensor> {
    check_config(config)?;

    let rgb = image.to_rgb8();
    let (resize_w, resize_h) = config.resize;
    let resized = imageops::resize(&rgb, resize_w, resize_h, RESIZE_FILTER);
    let cropped = center_crop(&resized, config.crop);

    tracing::debug!(
        source = ?(image.width(), image.height()),
        resize = ?config.resize,
        crop = ?config.crop,
        "Preprocessed image"
    );

    let (crop_w, crop_h) = config.crop;
    let data = to_normalized_chw(&cropped, config);
    Tensor::from_vec(data, [1, 3, crop_h as usize, crop_w as usize])
        .map_err(|e| ImageReadError::InvalidConfig(e.to_string()))
}

/// Offset of a centered window of `inner` pixels inside `outer` pixels.
fn crop_offset(outer: u32, inner: u32) -> u32 {
    ((outer - inner) as f32 / 2.0).round() as u32
}

fn center_crop(image: &RgbImage, (crop_w, crop_h): (u32, u32)) -> RgbImage {
    let x = crop_offset(image.width(), crop_w);
    let y = crop_offset(image.height(), crop_h);
    imageops::crop_imm(image, x, y, crop_w, crop_h).to_image()
}

/// Scale to [0, 1], normalize, and reorder HWC → CHW.
fn to_normalized_chw(image: &RgbImage, config: &PreprocessConfig) -> Vec<f32> {
    let plane = (image.width() * image.height()) as usize;
    let mut data = vec![0.0f32; 3 * plane];

    for (i, pixel) in image.pixels().enumerate() {
        for c in 0..3 {
            let value = pixel[c] as f32 / 255.0;
            data[c * plane + i] = (value - config.mean[c]) / config.std[c];
        }
    }
    data
}

fn check_config(config: &PreprocessConfig) -> Result<()> {
    let (resize_w, resize_h) = config.resize;
    let (crop_w, crop_h) = config.crop;
    if crop_w == 0 || crop_h == 0 {
        return Err(ImageReadError::InvalidConfig("crop size must be non-zero".to_string()));
    }
    if crop_w > resize_w || crop_h > resize_h {
        return Err(ImageReadError::InvalidConfig(format!(
            "crop {crop_w}x{crop_h} larger than resize {resize_w}x{resize_h}"
        )));
    }
    Ok(())
}
