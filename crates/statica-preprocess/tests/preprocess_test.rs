//! End-to-end preprocessing from image files.

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use statica_core::PreprocessConfig;
use statica_preprocess::{ImageReadError, preprocess, preprocess_bytes};

fn write_png(image: &RgbImage) -> tempfile::NamedTempFile {
    let file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
    image.save_with_format(file.path(), ImageFormat::Png).unwrap();
    file
}

/// A solid-color 256x256 image yields per-channel means of
/// `(color / 255 - mean[c]) / std[c]`.
#[test]
fn test_solid_color_channel_means() {
    let color = [200u8, 100, 30];
    let file = write_png(&RgbImage::from_pixel(256, 256, Rgb(color)));
    let config = PreprocessConfig::default();

    let tensor = preprocess(file.path(), &config).unwrap();
    assert_eq!(tensor.shape().dims(), &[1, 3, 224, 224]);

    let data = tensor.to_vec::<f32>().unwrap();
    let plane = 224 * 224;
    for c in 0..3 {
        let channel = &data[c * plane..(c + 1) * plane];
        let mean = channel.iter().map(|&v| v as f64).sum::<f64>() / plane as f64;
        let expected = (color[c] as f64 / 255.0 - config.mean[c] as f64) / config.std[c] as f64;
        assert!(
            (mean - expected).abs() < 1e-4,
            "channel {c}: mean {mean}, expected {expected}"
        );
    }
}

/// Identical bytes produce bit-identical tensors.
#[test]
fn test_preprocess_is_deterministic() {
    let mut image = RgbImage::new(320, 240);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        *pixel = Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 251) as u8]);
    }
    let file = write_png(&image);
    let bytes = std::fs::read(file.path()).unwrap();
    let config = PreprocessConfig::default();

    let first = preprocess(file.path(), &config).unwrap();
    let second = preprocess(file.path(), &config).unwrap();
    let third = preprocess_bytes(&bytes, &config).unwrap();

    assert_eq!(first.as_bytes(), second.as_bytes());
    assert_eq!(first.as_bytes(), third.as_bytes());
}

/// The crop takes the center of the resized image.
#[test]
fn test_center_crop_window() {
    // Left half black, right half white; the crop keeps both halves equally.
    let mut image = RgbImage::new(8, 8);
    for (x, _, pixel) in image.enumerate_pixels_mut() {
        *pixel = if x < 4 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) };
    }
    let config = PreprocessConfig {
        resize: (8, 8),
        crop: (4, 4),
        mean: [0.0; 3],
        std: [1.0; 3],
    };
    let tensor = statica_preprocess::preprocess_image(&DynamicImage::ImageRgb8(image), &config).unwrap();
    let red = &tensor.to_vec::<f32>().unwrap()[..16];

    let left: f32 = (0..4).map(|row| red[row * 4]).sum();
    let right: f32 = (0..4).map(|row| red[row * 4 + 3]).sum();
    assert!(left < 0.5, "left column should be dark, got {left}");
    assert!(right > 3.5, "right column should be bright, got {right}");
}

#[test]
fn test_missing_file() {
    let err = preprocess("/nonexistent/statica/dog.jpg", &PreprocessConfig::default()).unwrap_err();
    assert!(matches!(err, ImageReadError::Open { .. }));
}

#[test]
fn test_undecodable_file() {
    let mut file = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
    std::io::Write::write_all(&mut file, b"definitely not a jpeg").unwrap();

    let err = preprocess(file.path(), &PreprocessConfig::default()).unwrap_err();
    assert!(matches!(err, ImageReadError::Decode { .. }));
}
