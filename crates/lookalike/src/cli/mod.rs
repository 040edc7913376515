//! Command implementations.

pub mod check;
pub mod config;
pub mod import;
pub mod models;
pub mod profiles;
pub mod serve;

use std::path::PathBuf;
use std::sync::Arc;

use lookalike_core::{BlobStore, Config, EmbeddingEngine, LocalBlobStore, SimilarityStore};

/// Load the ResNet feature extractor named by `[embedding]`.
pub(crate) fn load_engine(config: &Config) -> anyhow::Result<Arc<EmbeddingEngine>> {
    let model_path = config.model_path();
    tracing::info!("Loading feature extractor from {}", model_path.display());
    let engine = EmbeddingEngine::load(&config.embedding, &model_path)?;
    Ok(Arc::new(engine))
}

/// Connect to the similarity store and open the blob store.
pub(crate) async fn open_stores(
    config: &Config,
) -> anyhow::Result<(Arc<dyn SimilarityStore>, Arc<dyn BlobStore>)> {
    let store = lookalike_core::store::connect(config).await?;
    let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::from_config(config));
    Ok((store, blobs))
}

/// Expand `~` in a path given on the command line.
pub(crate) fn expand(path: &std::path::Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}
