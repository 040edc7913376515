//! Lookalike Core - image similarity matching library.
//!
//! Lookalike fingerprints uploaded images and answers "how similar is this
//! image to the ones already stored" with cosine scores over CNN embeddings.
//!
//! # Architecture
//!
//! ```text
//! Bytes → Validate → Decode → {Perceptual hash, Embed (ResNet-50)} → Store | Score
//! ```
//!
//! The feature extractor, the similarity store and the blob store are all
//! injected behind traits, so services can run against SQLite or PostgreSQL
//! and against any deterministic extractor.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lookalike_core::{Config, EmbeddingEngine, ImageService, LocalBlobStore};
//!
//! #[tokio::main]
//! async fn main() -> lookalike_core::Result<()> {
//!     let config = Config::load()?;
//!     let engine = EmbeddingEngine::load(&config.embedding, &config.model_path())?;
//!     let store = lookalike_core::store::connect(&config).await?;
//!     let blobs = Arc::new(LocalBlobStore::from_config(&config));
//!     let images = ImageService::new(&config, Arc::new(engine), store, blobs);
//!
//!     let outcome = images.check_image(std::fs::read("cat.jpg")?, Default::default()).await?;
//!     println!("Scores: {:?}", outcome.scores);
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod blob;
pub mod config;
pub mod embedding;
pub mod error;
pub mod math;
pub mod pipeline;
pub mod service;
pub mod store;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-exports for convenient access
pub use blob::{BlobStore, LocalBlobStore};
pub use config::Config;
pub use embedding::{EmbeddingEngine, FeatureExtractor};
pub use error::{ConfigError, LookalikeError, PipelineError, PipelineResult, Result};
pub use pipeline::{Fingerprint, ImageProcessor};
pub use service::{CheckOptions, CheckOutcome, ImageService, ProfileService, StoredImage};
pub use store::SimilarityStore;
pub use types::{DeletePolicy, HashMatch, ImageRecord, NewImageRecord, Profile, ScoredImage};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
