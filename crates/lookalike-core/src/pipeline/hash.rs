//! Content and perceptual hashing.

use blake3::Hasher as Blake3Hasher;
use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig};

use crate::config::HashingConfig;

/// Provides content hashing and perceptual hashing for images.
///
/// The perceptual hasher is pre-configured and cached to avoid
/// re-allocating the same `HasherConfig` for every image.
pub struct Hasher {
    phash_hasher: image_hasher::Hasher,
    hash_size: u32,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new(&HashingConfig::default())
    }
}

impl Hasher {
    /// Create a hasher computing a DCT mean hash (pHash) on a
    /// `hash_size × hash_size` grid.
    pub fn new(config: &HashingConfig) -> Self {
        let phash_hasher = HasherConfig::new()
            .hash_alg(HashAlg::Mean)
            .preproc_dct()
            .hash_size(config.hash_size, config.hash_size)
            .to_hasher();
        Self {
            phash_hasher,
            hash_size: config.hash_size,
        }
    }

    /// Length in characters of every hash this hasher produces.
    pub fn hash_len(&self) -> usize {
        let bits = (self.hash_size * self.hash_size) as usize;
        bits.div_ceil(8) * 2
    }

    /// Generate a BLAKE3 hash from an in-memory byte buffer.
    pub fn content_hash_from_bytes(data: &[u8]) -> String {
        let mut hasher = Blake3Hasher::new();
        hasher.update(data);
        hasher.finalize().to_hex().to_string()
    }

    /// Generate a perceptual hash for near-duplicate detection.
    ///
    /// Returns a lowercase hex string of fixed length ([`Hasher::hash_len`]).
    /// Recompressed, resized or lightly cropped copies of an image land on
    /// identical or close hashes.
    pub fn perceptual_hash(&self, image: &DynamicImage) -> String {
        let hash = self.phash_hasher.hash_image(image);
        hex::encode(hash.as_bytes())
    }

    /// Compare two perceptual hashes and return their Hamming distance.
    ///
    /// Returns `None` if either hash is not valid hex or the lengths differ.
    pub fn hamming_distance(hash1: &str, hash2: &str) -> Option<u32> {
        let h1 = hex::decode(hash1).ok()?;
        let h2 = hex::decode(hash2).ok()?;
        if h1.len() != h2.len() {
            return None;
        }
        Some(
            h1.iter()
                .zip(h2.iter())
                .map(|(a, b)| (a ^ b).count_ones())
                .sum(),
        )
    }
}
