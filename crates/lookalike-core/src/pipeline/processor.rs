//! Pipeline orchestration - wires together all fingerprinting stages.

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::ImageFormat;
use tokio::time::timeout;

use crate::config::Config;
use crate::embedding::FeatureExtractor;
use crate::error::PipelineError;

use super::decode::{format_extension, ImageDecoder};
use super::hash::Hasher;
use super::validate::Validator;

/// Everything computed from an upload before the store is touched.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    /// BLAKE3 hex digest of the raw bytes
    pub content_hash: String,
    /// Perceptual hash (lowercase hex)
    pub hash: String,
    /// Feature vector from the extractor
    pub embedding: Vec<f32>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

impl Fingerprint {
    /// Blob key for the uploaded bytes: `{blake3}.{ext}`.
    pub fn storage_key(&self) -> String {
        format!("{}.{}", self.content_hash, format_extension(self.format))
    }
}

/// Runs validate, decode, hash and embed for a single upload.
pub struct ImageProcessor {
    validator: Validator,
    decoder: ImageDecoder,
    hasher: Arc<Hasher>,
    extractor: Arc<dyn FeatureExtractor>,
    embed_timeout_ms: u64,
}

impl ImageProcessor {
    /// Create a processor around a loaded feature extractor.
    pub fn new(config: &Config, extractor: Arc<dyn FeatureExtractor>) -> Self {
        Self {
            validator: Validator::new(config.limits.clone()),
            decoder: ImageDecoder::new(config.limits.clone()),
            hasher: Arc::new(Hasher::new(&config.hashing)),
            extractor,
            embed_timeout_ms: config.limits.embed_timeout_ms,
        }
    }

    /// Width of the vectors this processor produces.
    pub fn dimensions(&self) -> usize {
        self.extractor.dimensions()
    }

    /// Fingerprint an upload.
    ///
    /// Invalid or undecodable bytes fail before any hashing or inference.
    /// Hashing and inference share one blocking task bounded by the embed
    /// timeout.
    pub async fn fingerprint(&self, bytes: Arc<[u8]>) -> Result<Fingerprint, PipelineError> {
        let start = Instant::now();

        self.validator.validate(&bytes)?;
        let content_hash = Hasher::content_hash_from_bytes(&bytes);

        let decode_start = Instant::now();
        let decoded = self.decoder.decode_from_bytes(bytes).await?;
        tracing::trace!("  Decode: {:?}", decode_start.elapsed());

        let hasher = Arc::clone(&self.hasher);
        let extractor = Arc::clone(&self.extractor);
        let image = decoded.image;

        let embed_start = Instant::now();
        let result = timeout(
            Duration::from_millis(self.embed_timeout_ms),
            tokio::task::spawn_blocking(move || {
                let hash = hasher.perceptual_hash(&image);
                let embedding = extractor.embed(&image)?;
                Ok::<_, PipelineError>((hash, embedding))
            }),
        )
        .await;

        let (hash, embedding) = match result {
            Ok(Ok(Ok(pair))) => pair,
            Ok(Ok(Err(e))) => return Err(e),
            Ok(Err(e)) => {
                return Err(PipelineError::Embedding(format!("Task join error: {}", e)))
            }
            Err(_) => {
                return Err(PipelineError::Timeout {
                    stage: "embed".to_string(),
                    timeout_ms: self.embed_timeout_ms,
                })
            }
        };
        tracing::trace!("  Hash + embed: {:?}", embed_start.elapsed());

        if embedding.len() != self.extractor.dimensions() {
            return Err(PipelineError::Embedding(format!(
                "Extractor produced {} features, expected {}",
                embedding.len(),
                self.extractor.dimensions()
            )));
        }

        tracing::debug!(
            "Fingerprinted {}x{} {:?} in {:?}",
            decoded.width,
            decoded.height,
            decoded.format,
            start.elapsed()
        );

        Ok(Fingerprint {
            content_hash,
            hash,
            embedding,
            format: decoded.format,
            width: decoded.width,
            height: decoded.height,
        })
    }
}
