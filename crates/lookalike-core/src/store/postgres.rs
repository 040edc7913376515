//! PostgreSQL + pgvector similarity store; distances computed by `<=>`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;
use crate::error::{ConfigError, LookalikeError, Result};
use crate::pipeline::Hasher;
use crate::types::{
    sort_scored, DeletePolicy, HashMatch, ImageRecord, NewImageRecord, Profile, ScoredImage,
};

use super::{check_dimensions, check_hash, SimilarityStore};

const IMAGE_COLUMNS: &str = "id, profile_id, storage_key, file_name, hash, embedding, created_at";

/// Width of the `images.embedding` column in the migration.
const COLUMN_DIMENSIONS: usize = 2048;

#[derive(sqlx::FromRow)]
struct ImageRow {
    id: i64,
    profile_id: i64,
    storage_key: String,
    file_name: Option<String>,
    hash: Option<String>,
    embedding: Option<Vector>,
    created_at: DateTime<Utc>,
}

impl From<ImageRow> for ImageRecord {
    fn from(row: ImageRow) -> Self {
        Self {
            id: row.id,
            profile_id: row.profile_id,
            storage_key: row.storage_key,
            file_name: row.file_name,
            hash: row.hash,
            embedding: row.embedding.map(|v| v.to_vec()),
            created_at: row.created_at,
        }
    }
}

/// Similarity store on PostgreSQL with the pgvector extension.
pub struct PgVectorStore {
    pool: PgPool,
    dimensions: usize,
}

impl PgVectorStore {
    /// Connect to `url` and run migrations.
    pub async fn connect(url: &str, config: &DatabaseConfig, dimensions: usize) -> Result<Self> {
        if dimensions != COLUMN_DIMENSIONS {
            return Err(ConfigError::ValidationError(format!(
                "The pgvector schema stores {COLUMN_DIMENSIONS}-dimensional embeddings, \
                 embedding.dimensions is {dimensions}"
            ))
            .into());
        }

        tracing::info!("Connecting to PostgreSQL store");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(url)
            .await?;

        tracing::debug!("Running PostgreSQL migrations");
        sqlx::migrate!("./migrations/postgres").run(&pool).await?;

        Ok(Self { pool, dimensions })
    }
}

#[async_trait]
impl SimilarityStore for PgVectorStore {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn create_profile(&self, name: &str) -> Result<Profile> {
        let profile = sqlx::query_as::<_, Profile>(
            "INSERT INTO profiles (name, created_at) VALUES ($1, $2) RETURNING id, name, created_at",
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
        let profile = sqlx::query_as::<_, Profile>(
            "SELECT id, name, created_at FROM profiles WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn delete_profile(&self, name: &str, policy: DeletePolicy) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;

        let profile_id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM profiles WHERE name = $1 FOR UPDATE")
                .bind(name)
                .fetch_optional(&mut *tx)
                .await?;
        let profile_id =
            profile_id.ok_or_else(|| LookalikeError::NotFound(format!("Profile {name:?}")))?;

        let mut keys: Vec<String> = match policy {
            DeletePolicy::Reject => {
                let count: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM images WHERE profile_id = $1")
                        .bind(profile_id)
                        .fetch_one(&mut *tx)
                        .await?;
                if count > 0 {
                    return Err(LookalikeError::ConstraintViolation(format!(
                        "Profile {name:?} still owns {count} images"
                    )));
                }
                Vec::new()
            }
            DeletePolicy::Cascade => {
                sqlx::query_scalar("DELETE FROM images WHERE profile_id = $1 RETURNING storage_key")
                    .bind(profile_id)
                    .fetch_all(&mut *tx)
                    .await?
            }
        };

        sqlx::query("DELETE FROM profiles WHERE id = $1")
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

        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM profiles WHERE id = $1")
            .bind(record.profile_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(LookalikeError::ConstraintViolation(format!(
                "Profile {} does not exist",
                record.profile_id
            )));
        }

        let row = sqlx::query_as::<_, ImageRow>(&format!(
            "INSERT INTO images (profile_id, storage_key, file_name, hash, embedding, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {IMAGE_COLUMNS}"
        ))
        .bind(record.profile_id)
        .bind(&record.storage_key)
        .bind(&record.file_name)
        .bind(&record.hash)
        .bind(record.embedding.map(Vector::from))
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn get_image(&self, id: i64) -> Result<Option<ImageRecord>> {
        let row = sqlx::query_as::<_, ImageRow>(&format!(
            "SELECT {IMAGE_COLUMNS} FROM images WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn delete_image(&self, id: i64) -> Result<Option<String>> {
        let key = sqlx::query_scalar("DELETE FROM images WHERE id = $1 RETURNING storage_key")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(key)
    }

    async fn storage_key_in_use(&self, storage_key: &str) -> Result<bool> {
        let in_use: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM images WHERE storage_key = $1)")
                .bind(storage_key)
                .fetch_one(&self.pool)
                .await?;
        Ok(in_use)
    }

    async fn distances(&self, query: &[f32]) -> Result<Vec<ScoredImage>> {
        check_dimensions(query.len(), self.dimensions)?;

        let rows = sqlx::query_as::<_, (i64, i64, Option<f64>)>(
            "SELECT id, profile_id, 1 - (embedding <=> $1) AS score \
             FROM images WHERE embedding IS NOT NULL \
             ORDER BY score DESC, id ASC",
        )
        .bind(Vector::from(query.to_vec()))
        .fetch_all(&self.pool)
        .await?;

        // pgvector yields NaN for zero-norm operands; those score 0.
        let mut scored: Vec<ScoredImage> = rows
            .into_iter()
            .map(|(image_id, profile_id, score)| {
                let score = score.filter(|s| !s.is_nan()).unwrap_or(0.0) as f32;
                ScoredImage {
                    image_id,
                    profile_id,
                    score,
                }
            })
            .collect();
        sort_scored(&mut scored);
        Ok(scored)
    }

    async fn find_by_hash(&self, hash: &str, max_distance: u32) -> Result<Vec<HashMatch>> {
        check_hash(hash)?;

        if max_distance == 0 {
            let rows = sqlx::query_as::<_, (i64, i64, String)>(
                "SELECT id, profile_id, hash FROM images WHERE hash = $1 ORDER BY id",
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

        let rows = sqlx::query_as::<_, (i64, i64, String)>(
            "SELECT id, profile_id, hash FROM images WHERE hash IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut matches: Vec<HashMatch> = rows
            .into_iter()
            .filter_map(|(image_id, profile_id, stored)| {
                let distance = Hasher::hamming_distance(hash, &stored)?;
                (distance <= max_distance).then_some(HashMatch {
                    image_id,
                    profile_id,
                    hash: stored,
                    distance,
                })
            })
            .collect();
        matches.sort_by_key(|m| (m.distance, m.image_id));
        Ok(matches)
    }
}
