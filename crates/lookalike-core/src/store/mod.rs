//! Similarity store: profiles, image records and distance queries.
//!
//! Two backends share the [`SimilarityStore`] trait:
//! - [`SqliteStore`] (default): embeddings kept as little-endian `f32` blobs,
//!   cosine scoring done in process.
//! - `PgVectorStore` (feature `postgres`): a `vector(2048)` column scored by
//!   pgvector's `<=>` operator inside the query.

mod sqlite;

#[cfg(feature = "postgres")]
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{ConfigError, LookalikeError, Result};
use crate::types::{DeletePolicy, HashMatch, ImageRecord, NewImageRecord, Profile, ScoredImage};

pub use sqlite::SqliteStore;

#[cfg(feature = "postgres")]
pub use postgres::PgVectorStore;

/// Persistence and distance queries over profiles and image records.
#[async_trait]
pub trait SimilarityStore: Send + Sync {
    /// Width every stored and queried embedding must have.
    fn dimensions(&self) -> usize;

    /// Create a profile. Duplicate names are a `ConstraintViolation`.
    async fn create_profile(&self, name: &str) -> Result<Profile>;

    /// All profiles, oldest first.
    async fn list_profiles(&self) -> Result<Vec<Profile>>;

    async fn get_profile(&self, name: &str) -> Result<Option<Profile>>;

    /// Delete a profile under `policy`, returning the distinct storage keys of
    /// the images removed with it (empty under `Reject`).
    async fn delete_profile(&self, name: &str, policy: DeletePolicy) -> Result<Vec<String>>;

    /// Insert one image record in a single transaction.
    ///
    /// An unknown profile or an embedding of the wrong width is a
    /// `ConstraintViolation` and leaves no row behind.
    async fn insert(&self, record: NewImageRecord) -> Result<ImageRecord>;

    async fn get_image(&self, id: i64) -> Result<Option<ImageRecord>>;

    /// Delete one image record, returning its storage key.
    async fn delete_image(&self, id: i64) -> Result<Option<String>>;

    /// Whether any remaining record still points at `storage_key`.
    async fn storage_key_in_use(&self, storage_key: &str) -> Result<bool>;

    /// Score every record that has an embedding against `query`.
    ///
    /// `score = 1 - cosine_distance(stored, query)`, sorted by score
    /// descending, ties by id ascending. Nothing is thresholded or truncated.
    async fn distances(&self, query: &[f32]) -> Result<Vec<ScoredImage>>;

    /// Records whose perceptual hash is within `max_distance` bits of `hash`,
    /// sorted by distance then id. Zero means exact match.
    async fn find_by_hash(&self, hash: &str, max_distance: u32) -> Result<Vec<HashMatch>>;
}

/// Open the store selected by `database.url` and run its migrations.
pub async fn connect(config: &Config) -> Result<Arc<dyn SimilarityStore>> {
    let url = config.database_url();
    let dimensions = config.embedding.dimensions;

    if url.starts_with("sqlite:") {
        let store = SqliteStore::connect(&url, &config.database, dimensions).await?;
        return Ok(Arc::new(store));
    }

    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        #[cfg(feature = "postgres")]
        {
            let store = PgVectorStore::connect(&url, &config.database, dimensions).await?;
            return Ok(Arc::new(store));
        }
        #[cfg(not(feature = "postgres"))]
        {
            return Err(ConfigError::ValidationError(
                "database.url is a PostgreSQL URL but lookalike was built without the `postgres` feature"
                    .to_string(),
            )
            .into());
        }
    }

    Err(LookalikeError::Config(ConfigError::ValidationError(format!(
        "Unsupported database.url scheme: {url}"
    ))))
}

/// Reject query or insert vectors of the wrong width.
pub(crate) fn check_dimensions(actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(LookalikeError::ConstraintViolation(format!(
            "Embedding has {actual} dimensions, expected {expected}"
        )));
    }
    Ok(())
}

/// Reject malformed perceptual hash queries.
pub(crate) fn check_hash(hash: &str) -> Result<()> {
    if hash.is_empty() || hex::decode(hash).is_err() {
        return Err(LookalikeError::ConstraintViolation(format!(
            "Malformed perceptual hash: {hash:?}"
        )));
    }
    Ok(())
}
