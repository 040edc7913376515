//! SQLite-backed similarity store with in-process cosine scoring.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::config::DatabaseConfig;
use crate::error::{LookalikeError, Result};
use crate::math::similarity;
use crate::pipeline::Hasher;
use crate::types::{
    sort_scored, DeletePolicy, HashMatch, ImageRecord, NewImageRecord, Profile, ScoredImage,
};

use super::{check_dimensions, check_hash, SimilarityStore};

const IMAGE_COLUMNS: &str = "id, profile_id, storage_key, file_name, hash, embedding, created_at";

#[derive(sqlx::FromRow)]
struct ImageRow {
    id: i64,
    profile_id: i64,
    storage_key: String,
    file_name: Option<String>,
    hash: Option<String>,
    embedding: Option<Vec<u8>>,
    created_at: DateTime<Utc>,
}

impl ImageRow {
    fn into_record(self, dimensions: usize) -> Result<ImageRecord> {
        let embedding = match self.embedding {
            Some(blob) => Some(decode_embedding(&blob, dimensions)?),
            None => None,
        };
        Ok(ImageRecord {
            id: self.id,
            profile_id: self.profile_id,
            storage_key: self.storage_key,
            file_name: self.file_name,
            hash: self.hash,
            embedding,
            created_at: self.created_at,
        })
    }
}

/// Encode an embedding as packed little-endian `f32`.
pub(crate) fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a packed little-endian `f32` blob of exactly `dimensions` values.
pub(crate) fn decode_embedding(blob: &[u8], dimensions: usize) -> Result<Vec<f32>> {
    if blob.len() != dimensions * 4 {
        return Err(LookalikeError::StoreUnavailable(format!(
            "Stored embedding is {} bytes, expected {}",
            blob.len(),
            dimensions * 4
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Similarity store on a SQLite file.
pub struct SqliteStore {
    pool: SqlitePool,
    dimensions: usize,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and run migrations.
    pub async fn connect(url: &str, config: &DatabaseConfig, dimensions: usize) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(config.acquire_timeout_secs));

        if let Some(parent) = options.get_filename().parent() {
            if parent != Path::new("") {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    LookalikeError::StoreUnavailable(format!(
                        "Cannot create database directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        tracing::info!("Opening SQLite store at {}", options.get_filename().display());

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_with(options)
            .await?;

        tracing::debug!("Running SQLite migrations");
        sqlx::migrate!("./migrations/sqlite").run(&pool).await?;

        Ok(Self { pool, dimensions })
    }
}

#[async_trait]
impl SimilarityStore for SqliteStore {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn create_profile(&self, name: &str) -> Result<Profile> {
        let profile = sqlx::query_as::<_, Profile>(
            "INSERT INTO profiles (name, created_at) VALUES (?, ?) RETURNING id, name, created_at",
        )
        .bind(name)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn list_profiles(&self) -> Result<Vec<Profile>> {
        let profiles =
            sqlx::query_as::<_, Profile>("SELECT id, name, created_at FROM profiles ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(profiles)
    }

    async fn get_profile(&self, name: &str) -> Result<Option<Profile>> {
        let profile =
            sqlx::query_as::<_, Profile>("SELECT id, name, created_at FROM profiles WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(profile)
    }

    async fn delete_profile(&self, name: &str, policy: DeletePolicy) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;

        // Write first: a deferred transaction that reads before writing fails
        // with SQLITE_BUSY_SNAPSHOT when another connection commits in between.
        let profile_id: Option<i64> =
            sqlx::query_scalar("UPDATE profiles SET name = name WHERE name = ? RETURNING id")
                .bind(name)
                .fetch_optional(&mut *tx)
                .await?;
        let profile_id =
            profile_id.ok_or_else(|| LookalikeError::NotFound(format!("Profile {name:?}")))?;

        let mut keys: Vec<String> =
            sqlx::query_scalar("SELECT storage_key FROM images WHERE profile_id = ? ORDER BY id")
                .bind(profile_id)
                .fetch_all(&mut *tx)
                .await?;

        match policy {
            DeletePolicy::Reject if !keys.is_empty() => {
                return Err(LookalikeError::ConstraintViolation(format!(
                    "Profile {name:?} still owns {} images",
                    keys.len()
                )));
            }
            DeletePolicy::Reject => {}
            DeletePolicy::Cascade => {
                sqlx::query("DELETE FROM images WHERE profile_id = ?")
                    .bind(profile_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        sqlx::query("DELETE FROM profiles WHERE id = ?")
            .bind(profile_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn insert(&self, record: NewImageRecord) -> Result<ImageRecord> {
        if let Some(embedding) = &record.embedding {
            check_dimensions(embedding.len(), self.dimensions)?;
        }
        let blob = record.embedding.as_deref().map(encode_embedding);

        // One statement; the foreign key rejects unknown profiles.
        let row = sqlx::query_as::<_, ImageRow>(&format!(
            "INSERT INTO images (profile_id, storage_key, file_name, hash, embedding, created_at) \
             VALUES (?, ?, ?, ?, ?, ?) RETURNING {IMAGE_COLUMNS}"
        ))
        .bind(record.profile_id)
        .bind(&record.storage_key)
        .bind(&record.file_name)
        .bind(&record.hash)
        .bind(blob)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match LookalikeError::from(e) {
            LookalikeError::ConstraintViolation(msg) => LookalikeError::ConstraintViolation(
                format!("Profile {} does not exist: {msg}", record.profile_id),
            ),
            other => other,
        })?;

        row.into_record(self.dimensions)
    }

    async fn get_image(&self, id: i64) -> Result<Option<ImageRecord>> {
        let row = sqlx::query_as::<_, ImageRow>(&format!(
            "SELECT {IMAGE_COLUMNS} FROM images WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| r.into_record(self.dimensions)).transpose()
    }

    async fn delete_image(&self, id: i64) -> Result<Option<String>> {
        let key = sqlx::query_scalar("DELETE FROM images WHERE id = ? RETURNING storage_key")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(key)
    }

    async fn storage_key_in_use(&self, storage_key: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM images WHERE storage_key = ?")
            .bind(storage_key)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn distances(&self, query: &[f32]) -> Result<Vec<ScoredImage>> {
        check_dimensions(query.len(), self.dimensions)?;

        let mut rows = sqlx::query_as::<_, (i64, i64, Vec<u8>)>(
            "SELECT id, profile_id, embedding FROM images WHERE embedding IS NOT NULL",
        )
        .fetch(&self.pool);

        let mut scored = Vec::new();
        while let Some((image_id, profile_id, blob)) = rows.try_next().await? {
            let stored = decode_embedding(&blob, self.dimensions)?;
            scored.push(ScoredImage {
                image_id,
                profile_id,
                score: similarity(&stored, query),
            });
        }

        sort_scored(&mut scored);
        Ok(scored)
    }

    async fn find_by_hash(&self, hash: &str, max_distance: u32) -> Result<Vec<HashMatch>> {
        check_hash(hash)?;

        if max_distance == 0 {
            let rows = sqlx::query_as::<_, (i64, i64, String)>(
                "SELECT id, profile_id, hash FROM images WHERE hash = ? ORDER BY id",
            )
            .bind(hash)
            .fetch_all(&self.pool)
            .await?;
            return Ok(rows
                .into_iter()
                .map(|(image_id, profile_id, hash)| HashMatch {
                    image_id,
                    profile_id,
                    hash,
                    distance: 0,
                })
                .collect());
        }

        let mut rows = sqlx::query_as::<_, (i64, i64, String)>(
            "SELECT id, profile_id, hash FROM images WHERE hash IS NOT NULL",
        )
        .fetch(&self.pool);

        let mut matches = Vec::new();
        while let Some((image_id, profile_id, stored)) = rows.try_next().await? {
            match Hasher::hamming_distance(hash, &stored) {
                Some(distance) if distance <= max_distance => matches.push(HashMatch {
                    image_id,
                    profile_id,
                    hash: stored,
                    distance,
                }),
                _ => {}
            }
        }

        matches.sort_by_key(|m| (m.distance, m.image_id));
        Ok(matches)
    }
}
