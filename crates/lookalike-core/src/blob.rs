//! Blob storage for uploaded image bytes.
//!
//! Records only keep a storage key; the bytes live behind a [`BlobStore`].
//! Time-limited URLs carry the key and an expiry timestamp as query
//! parameters: `{base_url}/{key}?Key={key}&Expires={unix_ts}`.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;

use crate::config::Config;
use crate::error::{LookalikeError, Result};

/// Upload, fetch and delete blobs by key.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous blob.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Fetch the blob stored under `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Delete the blob under `key`. Missing blobs are not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// URL that serves `key` until `expires_in` from now.
    fn presigned_url(&self, key: &str, expires_in: Duration) -> String;

    /// Recover the key from a URL produced by [`BlobStore::presigned_url`] or
    /// a plain object URL.
    fn key_from_url(&self, url: &str) -> String;
}

/// Blob store on the local filesystem.
pub struct LocalBlobStore {
    dir: PathBuf,
    bucket: String,
    base_url: String,
}

impl LocalBlobStore {
    pub fn new(dir: impl Into<PathBuf>, bucket: &str, base_url: &str) -> Self {
        Self {
            dir: dir.into(),
            bucket: bucket.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Build from the `[storage]` section.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.storage_dir(),
            &config.storage.bucket,
            &config.storage.base_url,
        )
    }

    /// Root directory of the store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(&self.bucket).join(key))
    }
}

/// Keys are relative paths of `[A-Za-z0-9._-]` segments with no traversal.
pub fn validate_key(key: &str) -> Result<()> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '/');
    let invalid = key.is_empty()
        || !key.chars().all(allowed)
        || Path::new(key)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
    if invalid {
        return Err(LookalikeError::Blob(format!("Invalid blob key: {key:?}")));
    }
    Ok(())
}

/// Whether a presigned URL's `Expires` timestamp is still in the future.
pub fn url_is_live(expires: i64) -> bool {
    expires > Utc::now().timestamp()
}

/// Percent-decoded query parameter of an absolute or path-only URL.
fn query_param(url: &str, name: &str) -> Option<String> {
    let parsed = Url::parse(url)
        .or_else(|_| Url::parse("http://localhost/").and_then(|base| base.join(url)))
        .ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Temp file next to `path`, unique per call so concurrent puts of one key
/// never share it.
fn partial_path(path: &Path) -> PathBuf {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    let n = NEXT.fetch_add(1, Ordering::Relaxed);
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".{}.{n}.partial", std::process::id()));
    PathBuf::from(tmp)
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LookalikeError::Blob(format!("Cannot create {parent:?}: {e}")))?;
        }

        let tmp = partial_path(&path);
        if let Err(e) = tokio::fs::write(&tmp, bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(LookalikeError::Blob(format!("Cannot write {key}: {e}")));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(LookalikeError::Blob(format!("Cannot write {key}: {e}")));
        }

        tracing::debug!("Stored blob {} ({} bytes)", key, bytes.len());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(LookalikeError::NotFound(format!("Blob {key}")))
            }
            Err(e) => Err(LookalikeError::Blob(format!("Cannot read {key}: {e}"))),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!("Deleted blob {}", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LookalikeError::Blob(format!("Cannot delete {key}: {e}"))),
        }
    }

    fn presigned_url(&self, key: &str, expires_in: Duration) -> String {
        let expires = Utc::now().timestamp() + expires_in.as_secs() as i64;
        format!("{}/{key}?Key={key}&Expires={expires}", self.base_url)
    }

    fn key_from_url(&self, url: &str) -> String {
        if let Some(key) = query_param(url, "Key") {
            return key;
        }

        let without_query = url.split(['?', '#']).next().unwrap_or_default();
        if let Some(rest) = without_query.strip_prefix(&self.base_url) {
            return rest.trim_start_matches('/').to_string();
        }

        let path = match without_query.split_once("://") {
            Some((_, rest)) => rest.find('/').map(|i| &rest[i..]).unwrap_or_default(),
            None => without_query,
        };
        let path = path.strip_prefix('/').unwrap_or(path);
        let bucket_prefix = format!("{}/", self.bucket);
        path.strip_prefix(&bucket_prefix).unwrap_or(path).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> LocalBlobStore {
        LocalBlobStore::new(dir, "images", "http://127.0.0.1:8000/blobs/")
    }

    #[test]
    fn test_validate_key_rejects_traversal() {
        assert!(validate_key("abc123.jpg").is_ok());
        assert!(validate_key("2025/abc.png").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("a/../../b").is_err());
        assert!(validate_key("/abs.png").is_err());
        assert!(validate_key("./a.png").is_err());
        assert!(validate_key("a b.png").is_err());
        assert!(validate_key("a\\b.png").is_err());
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = store(dir.path());

        blobs.put("k.png", b"bytes").await.unwrap();
        assert!(dir.path().join("images").join("k.png").exists());
        assert_eq!(blobs.get("k.png").await.unwrap(), b"bytes");

        blobs.put("k.png", b"newer").await.unwrap();
        assert_eq!(blobs.get("k.png").await.unwrap(), b"newer");

        blobs.delete("k.png").await.unwrap();
        assert!(matches!(
            blobs.get("k.png").await,
            Err(LookalikeError::NotFound(_))
        ));
        // Idempotent
        blobs.delete("k.png").await.unwrap();
    }

    #[tokio::test]
    async fn test_put_rejects_bad_key() {
        let dir = tempfile::tempdir().unwrap();
        let err = store(dir.path()).put("../x", b"").await.unwrap_err();
        assert!(matches!(err, LookalikeError::Blob(_)));
    }

    #[test]
    fn test_presigned_url_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = store(dir.path());
        let url = blobs.presigned_url("abc.jpg", Duration::from_secs(60));

        assert!(url.starts_with("http://127.0.0.1:8000/blobs/abc.jpg?Key=abc.jpg&Expires="));
        assert_eq!(blobs.key_from_url(&url), "abc.jpg");

        let expires: i64 = query_param(&url, "Expires").unwrap().parse().unwrap();
        assert_eq!(query_param(&url, "Missing"), None);
        assert!(url_is_live(expires));
        assert!(!url_is_live(Utc::now().timestamp() - 1));
    }

    #[tokio::test]
    async fn test_concurrent_puts_of_one_key() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = std::sync::Arc::new(store(dir.path()));
        let bytes = std::sync::Arc::new(vec![7u8; 1 << 20]);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let blobs = std::sync::Arc::clone(&blobs);
                let bytes = std::sync::Arc::clone(&bytes);
                tokio::spawn(async move { blobs.put("same.png", &bytes).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(blobs.get("same.png").await.unwrap(), *bytes);
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("images"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("same.png")]);
    }

    #[test]
    fn test_key_from_encoded_query() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = store(dir.path());
        assert_eq!(
            blobs.key_from_url("https://s3.example.com/images/x?Key=folder%2Fa%20b.jpg&Expires=1"),
            "folder/a b.jpg"
        );
        assert_eq!(blobs.key_from_url("/blobs/x?Key=c%2Ed.png"), "c.d.png");
    }

    #[test]
    fn test_key_from_plain_urls() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = store(dir.path());
        assert_eq!(
            blobs.key_from_url("https://s3.example.com/images/folder/a.jpg"),
            "folder/a.jpg"
        );
        assert_eq!(blobs.key_from_url("https://cdn.example.com/a.jpg"), "a.jpg");
        assert_eq!(blobs.key_from_url("http://127.0.0.1:8000/blobs/b.png"), "b.png");
        assert_eq!(blobs.key_from_url("/images/c.png"), "c.png");
    }
}
