//! Image processing pipeline components.
//!
//! This module contains the stages an upload goes through before it is
//! stored or compared:
//! - **validate**: Size limit and magic-byte check on raw bytes
//! - **decode**: Decode with a timeout, enforce dimensions, convert to RGB
//! - **hash**: Content (BLAKE3) and perceptual hashes
//! - **processor**: Orchestrates the stages and runs the feature extractor

pub mod decode;
pub mod hash;
pub mod processor;
pub mod validate;

// Re-exports for convenient access
pub use decode::{DecodedImage, ImageDecoder};
pub use hash::Hasher;
pub use processor::{Fingerprint, ImageProcessor};
pub use validate::Validator;
