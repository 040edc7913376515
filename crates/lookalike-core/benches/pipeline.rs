//! Benchmarks for the Lookalike fingerprinting and scoring hot paths.
//!
//! Run with: cargo bench -p lookalike-core

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use lookalike_core::config::{EmbeddingConfig, HashingConfig};
use lookalike_core::pipeline::{Hasher, ImageDecoder};

fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    }))
}

fn png_bytes(img: &DynamicImage) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn benchmark_content_hash(c: &mut Criterion) {
    let bytes = png_bytes(&gradient(1024, 768));

    c.bench_function("content_hash_blake3", |b| {
        b.iter(|| Hasher::content_hash_from_bytes(black_box(&bytes)))
    });
}

fn benchmark_perceptual_hash(c: &mut Criterion) {
    let img = gradient(1024, 768);
    let hasher = Hasher::new(&HashingConfig::default());

    c.bench_function("perceptual_hash", |b| {
        b.iter(|| hasher.perceptual_hash(black_box(&img)))
    });
}

fn benchmark_decode(c: &mut Criterion) {
    let bytes = png_bytes(&gradient(1024, 768));

    c.bench_function("decode_png_1024x768", |b| {
        b.iter(|| ImageDecoder::decode_bytes_sync(black_box(&bytes)))
    });
}

fn benchmark_preprocess(c: &mut Criterion) {
    let img = gradient(1920, 1080);
    let config = EmbeddingConfig::default();

    c.bench_function("preprocess_resnet_224", |b| {
        b.iter(|| lookalike_core::embedding::preprocess(black_box(&img), &config))
    });
}

fn benchmark_cosine(c: &mut Criterion) {
    let a: Vec<f32> = (0..2048).map(|i| (i as f32 * 0.37).sin()).collect();
    let b: Vec<f32> = (0..2048).map(|i| (i as f32 * 0.11).cos()).collect();

    c.bench_function("similarity_2048", |bench| {
        bench.iter(|| lookalike_core::math::similarity(black_box(&a), black_box(&b)))
    });
}

criterion_group!(
    benches,
    benchmark_content_hash,
    benchmark_perceptual_hash,
    benchmark_decode,
    benchmark_preprocess,
    benchmark_cosine,
);
criterion_main!(benches);
