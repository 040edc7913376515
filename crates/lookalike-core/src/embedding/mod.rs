//! CNN feature embeddings.
//!
//! This module turns decoded images into fixed-length dense vectors using a
//! frozen ImageNet ResNet-50 (classifier removed) running locally via ONNX
//! Runtime. Vectors are compared with cosine similarity by the store.
//!
//! # Usage
//!
//! ```rust,ignore
//! use lookalike_core::embedding::{EmbeddingEngine, FeatureExtractor};
//! use lookalike_core::Config;
//!
//! let config = Config::default();
//! let engine = EmbeddingEngine::load(&config.embedding, &config.model_path())?;
//! let embedding = engine.embed(&decoded.image)?;
//! // embedding is a Vec<f32> with 2048 elements
//! ```

pub(crate) mod preprocess;
pub(crate) mod resnet;

use std::path::Path;

use image::DynamicImage;

use crate::config::EmbeddingConfig;
use crate::error::PipelineError;

pub use self::preprocess::preprocess;
use self::resnet::ResNetSession;

/// The feature extractor ONNX model filename.
pub const MODEL_FILENAME: &str = "model.onnx";

/// Anything that maps an image to a fixed-width feature vector.
///
/// Implementations must be deterministic: the same image always yields the
/// same vector. They are shared read-only across requests.
pub trait FeatureExtractor: Send + Sync {
    /// Width of every vector returned by [`FeatureExtractor::embed`].
    fn dimensions(&self) -> usize;

    /// Compute the feature vector for an RGB image.
    fn embed(&self, image: &DynamicImage) -> Result<Vec<f32>, PipelineError>;
}

/// Engine for generating image embeddings with a headless ResNet.
pub struct EmbeddingEngine {
    session: ResNetSession,
    config: EmbeddingConfig,
}

impl EmbeddingEngine {
    /// Load the feature extractor from `model_path`.
    pub fn load(config: &EmbeddingConfig, model_path: &Path) -> Result<Self, PipelineError> {
        if !model_path.exists() {
            return Err(PipelineError::Embedding(format!(
                "Model not found at {}. Run `lookalike models download` first.",
                model_path.display()
            )));
        }

        tracing::info!("Loading feature extractor from {:?}", model_path);
        let session = ResNetSession::load(model_path, &config.output_name)?;
        tracing::info!("Feature extractor loaded successfully");

        Ok(Self {
            session,
            config: config.clone(),
        })
    }

    /// Generate an embedding from an already-preprocessed tensor.
    pub fn embed_preprocessed(
        &self,
        tensor: &ndarray::Array4<f32>,
    ) -> Result<Vec<f32>, PipelineError> {
        let embedding = self.session.embed(tensor)?;
        if embedding.len() != self.config.dimensions {
            return Err(PipelineError::Embedding(format!(
                "Model produced {} features, expected {}",
                embedding.len(),
                self.config.dimensions
            )));
        }
        Ok(embedding)
    }

    /// Check whether the model file exists on disk.
    pub fn model_exists(model_path: &Path) -> bool {
        model_path.exists()
    }
}

impl FeatureExtractor for EmbeddingEngine {
    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn embed(&self, image: &DynamicImage) -> Result<Vec<f32>, PipelineError> {
        let tensor = preprocess(image, &self.config);
        self.embed_preprocessed(&tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_reports_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MODEL_FILENAME);
        assert!(!EmbeddingEngine::model_exists(&path));

        let err = match EmbeddingEngine::load(&EmbeddingConfig::default(), &path) {
            Ok(_) => panic!("loading a missing model must fail"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("lookalike models download"));
    }
}
