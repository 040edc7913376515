//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory where models are stored
    pub model_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("~/.lookalike/models"),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub addr: String,

    /// Maximum request body size in megabytes
    pub max_body_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8000".to_string(),
            max_body_mb: 10,
        }
    }
}

/// Datastore settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL: `sqlite://path/to/file.db` or `postgres://...`
    pub url: String,

    /// Maximum pooled connections
    pub max_connections: u32,

    /// Seconds to wait for a pooled connection
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://~/.lookalike/lookalike.db".to_string(),
            max_connections: 8,
            acquire_timeout_secs: 10,
        }
    }
}

/// Embedding model settings.
///
/// The defaults describe an ImageNet ResNet-50 with its classifier removed:
/// resize the short side to 256, center-crop 224, ImageNet mean/std.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Model name, also the subdirectory under `general.model_dir`
    pub model: String,

    /// Output vector width
    pub dimensions: usize,

    /// Shorter image side after the first resize
    pub resize_short_side: u32,

    /// Square center-crop size fed to the network
    pub crop_size: u32,

    /// Per-channel normalization mean (RGB)
    pub mean: [f32; 3],

    /// Per-channel normalization standard deviation (RGB)
    pub std: [f32; 3],

    /// Name of the output tensor holding pooled features.
    /// Empty selects the first output.
    pub output_name: String,

    /// Where `lookalike models download` fetches the ONNX file from
    pub download_url: Option<String>,

    /// Expected BLAKE3 checksum of the downloaded ONNX file
    pub download_blake3: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "resnet50-imagenet".to_string(),
            dimensions: 2048,
            resize_short_side: 256,
            crop_size: 224,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
            output_name: String::new(),
            download_url: None,
            download_blake3: None,
        }
    }
}

/// Perceptual hash settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingConfig {
    /// Hash grid side; the hash has `hash_size * hash_size` bits
    pub hash_size: u32,

    /// Hamming distance at or below which two hashes count as near-duplicates
    pub max_hamming_distance: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            hash_size: 8,
            max_hamming_distance: 6,
        }
    }
}

/// Similarity query settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Score at or above which a stored image counts as a match when
    /// `create_if_unique` is requested without an explicit threshold
    pub default_threshold: f32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            default_threshold: 0.9,
        }
    }
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum upload size in megabytes
    pub max_file_size_mb: u64,

    /// Maximum image dimension (width or height)
    pub max_image_dimension: u32,

    /// Decode timeout in milliseconds
    pub decode_timeout_ms: u64,

    /// Hash + embedding timeout in milliseconds
    pub embed_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 10,
            max_image_dimension: 10000,
            decode_timeout_ms: 5000,
            embed_timeout_ms: 30000,
        }
    }
}

/// Blob storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding uploaded image bytes
    pub dir: PathBuf,

    /// Bucket name, the first path segment of generated URLs
    pub bucket: String,

    /// Public base URL used when generating retrieval URLs
    pub base_url: String,

    /// Lifetime of generated retrieval URLs in seconds
    pub url_expiration_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("~/.lookalike/blobs"),
            bucket: "images".to_string(),
            base_url: "http://127.0.0.1:8000/blobs".to_string(),
            url_expiration_secs: 3600,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
