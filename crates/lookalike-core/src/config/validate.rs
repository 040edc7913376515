//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.is_empty() {
            return Err(ConfigError::ValidationError(
                "database.url must not be empty".into(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "database.max_connections must be > 0".into(),
            ));
        }
        if self.server.max_body_mb == 0 {
            return Err(ConfigError::ValidationError(
                "server.max_body_mb must be > 0".into(),
            ));
        }
        if self.embedding.dimensions == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimensions must be > 0".into(),
            ));
        }
        if self.embedding.crop_size == 0 || self.embedding.resize_short_side == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.crop_size and embedding.resize_short_side must be > 0".into(),
            ));
        }
        if self.embedding.crop_size > self.embedding.resize_short_side {
            return Err(ConfigError::ValidationError(
                "embedding.crop_size must not exceed embedding.resize_short_side".into(),
            ));
        }
        if self.embedding.std.iter().any(|s| *s <= 0.0) {
            return Err(ConfigError::ValidationError(
                "embedding.std values must be > 0".into(),
            ));
        }
        if !(2..=64).contains(&self.hashing.hash_size) {
            return Err(ConfigError::ValidationError(
                "hashing.hash_size must be between 2 and 64".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.matching.default_threshold) {
            return Err(ConfigError::ValidationError(
                "matching.default_threshold must be between 0.0 and 1.0".into(),
            ));
        }
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_dimension must be > 0".into(),
            ));
        }
        if self.limits.decode_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.decode_timeout_ms must be > 0".into(),
            ));
        }
        if self.limits.embed_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.embed_timeout_ms must be > 0".into(),
            ));
        }
        if self.storage.url_expiration_secs == 0 {
            return Err(ConfigError::ValidationError(
                "storage.url_expiration_secs must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_passes_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_dimensions() {
        let mut config = Config::default();
        config.embedding.dimensions = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("embedding.dimensions"));
    }

    #[test]
    fn test_validate_rejects_crop_larger_than_resize() {
        let mut config = Config::default();
        config.embedding.crop_size = 300;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("crop_size"));
    }

    #[test]
    fn test_validate_rejects_zero_std() {
        let mut config = Config::default();
        config.embedding.std = [0.229, 0.0, 0.225];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("embedding.std"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.limits.decode_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("decode_timeout_ms"));
    }

    #[test]
    fn test_validate_rejects_invalid_threshold() {
        let mut config = Config::default();
        config.matching.default_threshold = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("default_threshold"));

        config.matching.default_threshold = -0.1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("default_threshold"));
    }

    #[test]
    fn test_validate_rejects_tiny_hash() {
        let mut config = Config::default();
        config.hashing.hash_size = 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("hashing.hash_size"));
    }
}
