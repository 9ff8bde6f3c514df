//! Conversions between images and `(N, H, W, C)` arrays.

use std::path::Path;

use image::{DynamicImage, GrayImage, RgbImage};
use ndarray::{stack, Array3, Array4, Axis};

use crate::error::{CoreError, Result};

/// A raw input image together with the filename it was uploaded under.
#[derive(Debug, Clone)]
pub struct InputImage {
    /// Name used to derive output filenames.
    pub filename: String,
    /// Decoded image, any mode and size.
    pub data: DynamicImage,
}

impl InputImage {
    /// Wrap an already decoded image.
    pub fn new(filename: impl Into<String>, data: DynamicImage) -> Self {
        Self {
            filename: filename.into(),
            data,
        }
    }

    /// Decode an image from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = image::open(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        Ok(Self { filename, data })
    }

    /// Filename without its extension.
    pub fn stem(&self) -> &str {
        Path::new(&self.filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.filename)
    }
}

/// Convert an RGB image to an `(H, W, 3)` array, multiplying every value by `scale`.
pub fn rgb_to_array(img: &RgbImage, scale: f32) -> Array3<f32> {
    let (width, height) = img.dimensions();
    Array3::from_shape_fn((height as usize, width as usize, 3), |(y, x, c)| {
        img.get_pixel(x as u32, y as u32)[c] as f32 * scale
    })
}

/// Convert a grayscale image to an `(H, W, 1)` array, multiplying every value by `scale`.
pub fn luma_to_array(img: &GrayImage, scale: f32) -> Array3<f32> {
    let (width, height) = img.dimensions();
    Array3::from_shape_fn((height as usize, width as usize, 1), |(y, x, _)| {
        img.get_pixel(x as u32, y as u32)[0] as f32 * scale
    })
}

/// Stack same-sized `(H, W, C)` examples into an `(N, H, W, C)` batch.
pub fn stack_examples(examples: &[Array3<f32>]) -> Result<Array4<f32>> {
    let first = examples
        .first()
        .ok_or_else(|| CoreError::InvalidInput("empty batch".to_string()))?;
    if let Some(other) = examples.iter().find(|e| e.dim() != first.dim()) {
        return Err(CoreError::InvalidShape {
            expected: format!("{:?}", first.dim()),
            got: format!("{:?}", other.dim()),
        });
    }
    let views: Vec<_> = examples.iter().map(|e| e.view()).collect();
    stack(Axis(0), &views).map_err(|e| CoreError::InvalidInput(e.to_string()))
}

/// Identity preprocessing: raw RGB pixel values as `f32`, no resizing or scaling.
///
/// All images must share the same size.
pub fn raw_rgb_batch(images: &[DynamicImage]) -> Result<Array4<f32>> {
    let examples: Vec<Array3<f32>> = images
        .iter()
        .map(|img| rgb_to_array(&img.to_rgb8(), 1.0))
        .collect();
    stack_examples(&examples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn test_rgb_to_array_layout() {
        let mut img = RgbImage::new(3, 2);
        img.put_pixel(2, 1, Rgb([10, 20, 30]));

        let arr = rgb_to_array(&img, 1.0);
        assert_eq!(arr.dim(), (2, 3, 3));
        assert_eq!(arr[[1, 2, 0]], 10.0);
        assert_eq!(arr[[1, 2, 2]], 30.0);
        assert_eq!(arr[[0, 0, 0]], 0.0);
    }

    #[test]
    fn test_luma_to_array_scaled() {
        let mut img = GrayImage::new(2, 2);
        img.put_pixel(1, 0, Luma([255]));

        let arr = luma_to_array(&img, 1.0 / 255.0);
        assert_eq!(arr.dim(), (2, 2, 1));
        assert!((arr[[0, 1, 0]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_raw_rgb_batch_requires_equal_sizes() {
        let a = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        let b = DynamicImage::ImageRgb8(RgbImage::new(5, 4));

        assert_eq!(raw_rgb_batch(&[a.clone(), a.clone()]).unwrap().dim(), (2, 4, 4, 3));
        assert!(raw_rgb_batch(&[a, b]).is_err());
        assert!(raw_rgb_batch(&[]).is_err());
    }

    #[test]
    fn test_input_image_stem() {
        let img = InputImage::new("digit.seven.png", DynamicImage::new_rgb8(1, 1));
        assert_eq!(img.stem(), "digit.seven");
    }
}
