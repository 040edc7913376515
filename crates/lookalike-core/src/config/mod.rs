//! Configuration management for Lookalike.
//!
//! Configuration is loaded from a TOML file with defaults for every field,
//! so a partial (or missing) file is always valid input.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for Lookalike.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// HTTP server settings
    pub server: ServerConfig,

    /// Datastore settings
    pub database: DatabaseConfig,

    /// Embedding model settings
    pub embedding: EmbeddingConfig,

    /// Perceptual hash settings
    pub hashing: HashingConfig,

    /// Similarity query settings
    pub matching: MatchingConfig,

    /// Resource limits
    pub limits: LimitsConfig,

    /// Blob storage settings
    pub storage: StorageConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.lookalike.lookalike/config.toml
    /// - Linux: ~/.config/lookalike/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\lookalike\config\config.toml
    ///
    /// Falls back to ~/.lookalike/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "lookalike", "lookalike")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".lookalike").join("config.toml")
            })
    }

    /// Get the resolved model directory path (with ~ expansion).
    pub fn model_dir(&self) -> PathBuf {
        expand_path(&self.general.model_dir)
    }

    /// Path of the ONNX feature extractor for the configured model.
    pub fn model_path(&self) -> PathBuf {
        self.model_dir()
            .join(&self.embedding.model)
            .join(crate::embedding::MODEL_FILENAME)
    }

    /// Get the resolved blob directory path (with ~ expansion).
    pub fn storage_dir(&self) -> PathBuf {
        expand_path(&self.storage.dir)
    }

    /// Database URL with `~` expanded in SQLite file paths.
    pub fn database_url(&self) -> String {
        match self.database.url.strip_prefix("sqlite://") {
            Some(rest) => format!("sqlite://{}", shellexpand::tilde(rest)),
            None => self.database.url.clone(),
        }
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

fn expand_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    let expanded = shellexpand::tilde(&path_str);
    PathBuf::from(expanded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.embedding.dimensions, 2048);
        assert_eq!(config.embedding.resize_short_side, 256);
        assert_eq!(config.embedding.crop_size, 224);
        assert_eq!(config.hashing.hash_size, 8);
        assert_eq!(config.server.addr, "127.0.0.1:8000");
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[database]"));
        assert!(toml.contains("[embedding]"));
        assert!(toml.contains("[storage]"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [database]
            url = "sqlite://./test.db"

            [matching]
            default_threshold = 0.75
            "#,
        )
        .unwrap();
        assert_eq!(config.database.url, "sqlite://./test.db");
        assert_eq!(config.database.max_connections, 8);
        assert!((config.matching.default_threshold - 0.75).abs() < f32::EPSILON);
        assert_eq!(config.embedding.dimensions, 2048);
    }

    #[test]
    fn test_from_toml_validates() {
        let err = Config::from_toml("[embedding]\ndimensions = 0\n").unwrap_err();
        assert!(err.to_string().contains("embedding.dimensions"));
    }

    #[test]
    fn test_model_path_layout() {
        let mut config = Config::default();
        config.general.model_dir = PathBuf::from("/opt/models");
        assert_eq!(
            config.model_path(),
            PathBuf::from("/opt/models/resnet50-imagenet/model.onnx")
        );
    }

    #[test]
    fn test_database_url_passthrough_for_postgres() {
        let mut config = Config::default();
        config.database.url = "postgres://user@localhost/images".to_string();
        assert_eq!(config.database_url(), "postgres://user@localhost/images");
    }
}
