//! Image preprocessing for ImageNet-style CNN feature extraction.
//!
//! ResNet-50 with ImageNet weights expects:
//! - Shorter side resized to 256 pixels, aspect ratio kept
//! - Center crop of 224×224 pixels
//! - Pixels scaled to [0, 1], then normalized with the ImageNet mean/std
//! - Channel order: RGB
//! - Tensor layout: NCHW [batch, channels, height, width]
//!
//! The exact sizes and constants come from [`EmbeddingConfig`]; changing them
//! invalidates every stored embedding.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use ndarray::Array4;

use crate::config::EmbeddingConfig;

/// Number of color channels (RGB).
const CHANNELS: usize = 3;

/// Target size after resizing the shorter side to `short_side`.
///
/// The longer side is truncated, matching the reference transform.
pub fn resized_dimensions(width: u32, height: u32, short_side: u32) -> (u32, u32) {
    if width <= height {
        let long = (short_side as u64 * height as u64 / width.max(1) as u64) as u32;
        (short_side, long.max(1))
    } else {
        let long = (short_side as u64 * width as u64 / height.max(1) as u64) as u32;
        (long.max(1), short_side)
    }
}

/// Offset of a centered window of `crop` pixels inside `dim` pixels.
fn center_offset(dim: u32, crop: u32) -> u32 {
    ((dim.saturating_sub(crop)) as f64 / 2.0).round_ties_even() as u32
}

/// Preprocess an image for feature extraction.
///
/// Resizes the shorter side, center-crops a square, converts to RGB,
/// normalizes per channel and returns an NCHW tensor suitable for ONNX Runtime.
pub fn preprocess(image: &DynamicImage, config: &EmbeddingConfig) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let (new_w, new_h) = resized_dimensions(width, height, config.resize_short_side);
    let resized = image.resize_exact(new_w, new_h, FilterType::Triangle);

    let crop = config.crop_size;
    let left = center_offset(new_w, crop);
    let top = center_offset(new_h, crop);
    let rgb = resized.crop_imm(left, top, crop, crop).to_rgb8();

    let size = crop as usize;
    let mut tensor = Array4::<f32>::zeros((1, CHANNELS, size, size));

    let plane = size * size;
    let raw = rgb.as_raw();
    if let Some(tensor_data) = tensor.as_slice_mut() {
        for (i, pixel) in raw.chunks_exact(CHANNELS).enumerate() {
            for (c, &val) in pixel.iter().enumerate() {
                // NCHW layout: offset = c * size * size + y * size + x
                tensor_data[c * plane + i] =
                    (val as f32 / 255.0 - config.mean[c]) / config.std[c];
            }
        }
    }

    tensor
}
