//! Fixtures shared by unit tests here and in dependent crates (behind the
//! `test-util` feature): synthetic images, a tiny extractor and a config
//! rooted in a temp dir.

use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use crate::config::Config;
use crate::embedding::FeatureExtractor;
use crate::error::PipelineError;

/// Side of the pooled grid used by [`PooledPixels`].
const GRID: u32 = 8;

/// Deterministic synthetic image. Seed 0 is a smooth gradient; any other seed
/// is high-frequency noise unrelated to it.
pub fn sample_image(width: u32, height: u32, seed: u32) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        if seed == 0 {
            Rgb([
                (x * 255 / width.max(1)) as u8,
                (y * 255 / height.max(1)) as u8,
                128,
            ])
        } else {
            let n = (x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663))
                .wrapping_mul(seed.wrapping_mul(2_654_435_761));
            Rgb([(n >> 24) as u8, (n >> 16) as u8, (n >> 8) as u8])
        }
    });
    DynamicImage::ImageRgb8(img)
}

pub fn png_bytes(width: u32, height: u32, seed: u32) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    sample_image(width, height, seed)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

pub fn jpeg_bytes(width: u32, height: u32, seed: u32, quality: u8) -> Vec<u8> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(&sample_image(width, height, seed))
        .unwrap();
    buf
}

/// Extractor that average-pools the image to an 8x8 RGB grid, centered on 0.
#[derive(Debug, Default)]
pub struct PooledPixels;

impl PooledPixels {
    pub fn new() -> Self {
        Self
    }

    pub const DIMENSIONS: usize = (GRID * GRID * 3) as usize;
}

impl FeatureExtractor for PooledPixels {
    fn dimensions(&self) -> usize {
        Self::DIMENSIONS
    }

    fn embed(&self, image: &DynamicImage) -> Result<Vec<f32>, PipelineError> {
        let small = image.resize_exact(GRID, GRID, FilterType::Triangle).to_rgb8();
        Ok(small
            .as_raw()
            .iter()
            .map(|&v| v as f32 / 255.0 - 0.5)
            .collect())
    }
}

/// Default config with the datastore and blobs under `dir` and the vector
/// width of [`PooledPixels`].
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.database.url = format!("sqlite://{}", dir.join("lookalike.db").display());
    config.database.max_connections = 2;
    config.storage.dir = dir.join("blobs");
    config.embedding.dimensions = PooledPixels::DIMENSIONS;
    config
}
