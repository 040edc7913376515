//! Services: image intake, similarity queries and profile management.
//!
//! Everything expensive (validate, decode, hash, embed) happens before the
//! store is touched, so transactions stay short and bad input never reaches
//! the datastore.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher as _};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};

use crate::blob::{url_is_live, BlobStore};
use crate::config::Config;
use crate::embedding::FeatureExtractor;
use crate::error::{LookalikeError, Result};
use crate::pipeline::{Fingerprint, ImageProcessor};
use crate::store::SimilarityStore;
use crate::types::{DeletePolicy, HashMatch, ImageRecord, NewImageRecord, Profile, ScoredImage};

/// Options for [`ImageService::check_image`].
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// Profile a unique image is created under; required with `create_if_unique`
    pub profile: Option<String>,
    /// Drop scores below this value
    pub threshold: Option<f32>,
    /// Insert the image when nothing scores at or above the threshold
    pub create_if_unique: bool,
    /// Client-supplied file name for a created record
    pub file_name: Option<String>,
}

/// Result of a similarity check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    /// Scores against every stored embedding, best first
    pub scores: Vec<ScoredImage>,
    /// Stored images whose perceptual hash is within `hashing.max_hamming_distance`
    pub duplicates: Vec<HashMatch>,
    /// Record inserted because the image was unique
    pub created: Option<ImageRecord>,
}

/// A stored image with a time-limited URL to its bytes.
#[derive(Debug, Clone, Serialize)]
pub struct StoredImage {
    #[serde(flatten)]
    pub record: ImageRecord,
    pub url: String,
}

const KEY_LOCK_STRIPES: usize = 64;

/// Striped locks serializing, per storage key, "put blob then insert row"
/// against "check references then delete blob".
struct KeyLocks {
    stripes: Vec<Mutex<()>>,
}

impl KeyLocks {
    fn new() -> Self {
        Self {
            stripes: (0..KEY_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    async fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let stripe = hasher.finish() as usize % self.stripes.len();
        self.stripes[stripe].lock().await
    }
}

/// Image intake and similarity queries.
pub struct ImageService {
    processor: ImageProcessor,
    store: Arc<dyn SimilarityStore>,
    blobs: Arc<dyn BlobStore>,
    locks: Arc<KeyLocks>,
    default_threshold: f32,
    max_hamming_distance: u32,
    url_expiration: Duration,
}

impl ImageService {
    pub fn new(
        config: &Config,
        extractor: Arc<dyn FeatureExtractor>,
        store: Arc<dyn SimilarityStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            processor: ImageProcessor::new(config, extractor),
            store,
            blobs,
            locks: Arc::new(KeyLocks::new()),
            default_threshold: config.matching.default_threshold,
            max_hamming_distance: config.hashing.max_hamming_distance,
            url_expiration: Duration::from_secs(config.storage.url_expiration_secs),
        }
    }

    /// Profile management sharing this service's store, blobs and key locks.
    pub fn profiles(&self) -> ProfileService {
        ProfileService {
            store: Arc::clone(&self.store),
            blobs: Arc::clone(&self.blobs),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Fingerprint `bytes` and store them under `profile_name`.
    ///
    /// No deduplication: identical uploads create separate records sharing
    /// one blob.
    pub async fn create_image(
        &self,
        bytes: impl Into<Arc<[u8]>>,
        file_name: Option<String>,
        profile_name: &str,
    ) -> Result<ImageRecord> {
        let bytes = bytes.into();
        let fingerprint = self.processor.fingerprint(Arc::clone(&bytes)).await?;
        let profile = self.require_profile(profile_name).await?;
        self.persist(&bytes, fingerprint, file_name, &profile).await
    }

    /// Score `bytes` against every stored embedding.
    pub async fn check_image(
        &self,
        bytes: impl Into<Arc<[u8]>>,
        options: CheckOptions,
    ) -> Result<CheckOutcome> {
        if options.create_if_unique && options.profile.is_none() {
            return Err(LookalikeError::ConstraintViolation(
                "create_if_unique requires a profile".to_string(),
            ));
        }

        let bytes = bytes.into();
        let fingerprint = self.processor.fingerprint(Arc::clone(&bytes)).await?;

        let mut scores = self.store.distances(&fingerprint.embedding).await?;
        let duplicates = self
            .store
            .find_by_hash(&fingerprint.hash, self.max_hamming_distance)
            .await?;

        let cutoff = options.threshold.unwrap_or(self.default_threshold);
        let unique = !scores.iter().any(|s| s.score >= cutoff);

        if let Some(threshold) = options.threshold {
            scores.retain(|s| s.score >= threshold);
        }

        let created = match (options.create_if_unique && unique, options.profile.as_deref()) {
            (true, Some(profile_name)) => {
                let profile = self.require_profile(profile_name).await?;
                let record = self
                    .persist(&bytes, fingerprint, options.file_name, &profile)
                    .await?;
                Some(record)
            }
            _ => None,
        };

        tracing::debug!(
            "Checked image: {} scores, {} hash duplicates, created: {}",
            scores.len(),
            duplicates.len(),
            created.is_some()
        );

        Ok(CheckOutcome {
            scores,
            duplicates,
            created,
        })
    }

    /// Fetch a record with a time-limited URL to its bytes.
    pub async fn get_image(&self, id: i64) -> Result<StoredImage> {
        let record = self
            .store
            .get_image(id)
            .await?
            .ok_or_else(|| LookalikeError::NotFound(format!("Image {id}")))?;
        let url = self
            .blobs
            .presigned_url(&record.storage_key, self.url_expiration);
        Ok(StoredImage { record, url })
    }

    /// Delete a record, and its blob once no record refers to it.
    pub async fn delete_image(&self, id: i64) -> Result<()> {
        let key = self
            .store
            .delete_image(id)
            .await?
            .ok_or_else(|| LookalikeError::NotFound(format!("Image {id}")))?;
        release_blob(self.store.as_ref(), self.blobs.as_ref(), &self.locks, &key).await;
        tracing::info!("Deleted image {}", id);
        Ok(())
    }

    /// Read blob bytes for a presigned URL that has not expired.
    pub async fn read_blob(&self, key: &str, expires: i64) -> Result<Vec<u8>> {
        if !url_is_live(expires) {
            return Err(LookalikeError::NotFound(format!("Blob {key} (link expired)")));
        }
        self.blobs.get(key).await
    }

    async fn require_profile(&self, name: &str) -> Result<Profile> {
        self.store.get_profile(name).await?.ok_or_else(|| {
            LookalikeError::ConstraintViolation(format!("Profile {name:?} does not exist"))
        })
    }

    async fn persist(
        &self,
        bytes: &[u8],
        fingerprint: Fingerprint,
        file_name: Option<String>,
        profile: &Profile,
    ) -> Result<ImageRecord> {
        let storage_key = fingerprint.storage_key();
        let _guard = self.locks.lock(&storage_key).await;
        self.blobs.put(&storage_key, bytes).await?;

        let record = NewImageRecord {
            profile_id: profile.id,
            storage_key: storage_key.clone(),
            file_name,
            hash: Some(fingerprint.hash),
            embedding: Some(fingerprint.embedding),
        };

        match self.store.insert(record).await {
            Ok(record) => {
                tracing::info!(
                    "Stored image {} ({}) for profile {:?}",
                    record.id,
                    storage_key,
                    profile.name
                );
                Ok(record)
            }
            Err(e) => {
                release_unlocked(self.store.as_ref(), self.blobs.as_ref(), &storage_key).await;
                Err(e)
            }
        }
    }
}

/// Profile management.
pub struct ProfileService {
    store: Arc<dyn SimilarityStore>,
    blobs: Arc<dyn BlobStore>,
    locks: Arc<KeyLocks>,
}

impl ProfileService {
    /// Standalone profile management; use [`ImageService::profiles`] when
    /// images are written concurrently in the same process.
    pub fn new(store: Arc<dyn SimilarityStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            blobs,
            locks: Arc::new(KeyLocks::new()),
        }
    }

    /// Create a profile; names are trimmed and must be non-empty and unique.
    pub async fn create_profile(&self, name: &str) -> Result<Profile> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LookalikeError::ConstraintViolation(
                "Profile name must not be empty".to_string(),
            ));
        }
        let profile = self.store.create_profile(name).await?;
        tracing::info!("Created profile {:?} ({})", profile.name, profile.id);
        Ok(profile)
    }

    pub async fn list_profiles(&self) -> Result<Vec<Profile>> {
        self.store.list_profiles().await
    }

    pub async fn get_profile(&self, name: &str) -> Result<Profile> {
        self.store
            .get_profile(name)
            .await?
            .ok_or_else(|| LookalikeError::NotFound(format!("Profile {name:?}")))
    }

    /// Delete a profile. Under `Cascade` the profile's images go with it and
    /// their blobs are removed after the transaction commits.
    pub async fn delete_profile(&self, name: &str, policy: DeletePolicy) -> Result<()> {
        let keys = self.store.delete_profile(name, policy).await?;
        for key in &keys {
            release_blob(self.store.as_ref(), self.blobs.as_ref(), &self.locks, key).await;
        }
        tracing::info!(
            "Deleted profile {:?} ({:?}, {} blobs released)",
            name,
            policy,
            keys.len()
        );
        Ok(())
    }
}

/// Delete a blob unless a remaining record still refers to it. Failures are
/// logged, never surfaced.
async fn release_blob(
    store: &dyn SimilarityStore,
    blobs: &dyn BlobStore,
    locks: &KeyLocks,
    key: &str,
) {
    let _guard = locks.lock(key).await;
    release_unlocked(store, blobs, key).await;
}

/// [`release_blob`] for callers already holding the key's lock.
async fn release_unlocked(store: &dyn SimilarityStore, blobs: &dyn BlobStore, key: &str) {
    match store.storage_key_in_use(key).await {
        Ok(false) => {
            if let Err(e) = blobs.delete(key).await {
                tracing::warn!("Failed to delete blob {}: {}", key, e);
            }
        }
        Ok(true) => {}
        Err(e) => tracing::warn!("Keeping blob {}: cannot check references: {}", key, e),
    }
}
