//! Error types for the Lookalike similarity pipeline.
//!
//! Pipeline stages report [`PipelineError`] with the stage-specific context
//! (which limit was hit, which step timed out). Services collapse those into
//! the [`LookalikeError`] taxonomy that callers and the HTTP boundary act on.

use thiserror::Error;

/// Top-level error type for Lookalike operations.
#[derive(Error, Debug)]
pub enum LookalikeError {
    /// Input bytes are not a decodable image (or violate the input limits)
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Referential integrity or uniqueness failure (unknown profile, duplicate
    /// name, wrong embedding width, profile still owning images)
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// The addressed profile or image does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Datastore connection, pool or query failure
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Embedding pipeline failed to initialize or execute
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// A blocking stage did not finish in time
    #[error("Timeout in {stage} stage after {timeout_ms}ms")]
    Timeout { stage: String, timeout_ms: u64 },

    /// Blob store read/write failure
    #[error("Blob store error: {0}")]
    Blob(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl LookalikeError {
    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidImage(_) => "invalid_image",
            Self::ConstraintViolation(_) => "constraint_violation",
            Self::NotFound(_) => "not_found",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::Timeout { .. } => "timeout",
            Self::Blob(_) => "blob",
            Self::Config(_) => "config",
        }
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Pipeline processing errors, organized by stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Image decoding failed
    #[error("Decode error: {0}")]
    Decode(String),

    /// Embedding generation failed
    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// Operation timed out
    #[error("Timeout in {stage} stage after {timeout_ms}ms")]
    Timeout { stage: String, timeout_ms: u64 },

    /// Upload exceeds size limit
    #[error("File too large: {size_mb}MB > {max_mb}MB")]
    FileTooLarge { size_mb: u64, max_mb: u64 },

    /// Image dimensions exceed limit
    #[error("Image too large: {width}x{height} > {max_dim}")]
    ImageTooLarge {
        width: u32,
        height: u32,
        max_dim: u32,
    },

    /// Unsupported image format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

impl From<PipelineError> for LookalikeError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Embedding(message) => Self::ModelUnavailable(message),
            PipelineError::Timeout { stage, timeout_ms } => Self::Timeout { stage, timeout_ms },
            other => Self::InvalidImage(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for LookalikeError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        match &err {
            sqlx::Error::Database(db_err) => match db_err.kind() {
                ErrorKind::ForeignKeyViolation
                | ErrorKind::UniqueViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => Self::ConstraintViolation(db_err.message().to_string()),
                _ => Self::StoreUnavailable(err.to_string()),
            },
            _ => Self::StoreUnavailable(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for LookalikeError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::StoreUnavailable(format!("Migration failed: {err}"))
    }
}

/// Convenience type alias for Lookalike results.
pub type Result<T> = std::result::Result<T, LookalikeError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_errors_become_invalid_image() {
        let err: LookalikeError = PipelineError::Decode("truncated".into()).into();
        assert!(matches!(err, LookalikeError::InvalidImage(_)));

        let err: LookalikeError = PipelineError::FileTooLarge {
            size_mb: 50,
            max_mb: 10,
        }
        .into();
        assert!(matches!(err, LookalikeError::InvalidImage(_)));
        assert!(err.to_string().contains("50MB"));
    }

    #[test]
    fn test_embedding_error_becomes_model_unavailable() {
        let err: LookalikeError = PipelineError::Embedding("session gone".into()).into();
        assert_eq!(err.kind(), "model_unavailable");
    }

    #[test]
    fn test_timeout_keeps_stage() {
        let err: LookalikeError = PipelineError::Timeout {
            stage: "embed".into(),
            timeout_ms: 30000,
        }
        .into();
        match err {
            LookalikeError::Timeout { stage, timeout_ms } => {
                assert_eq!(stage, "embed");
                assert_eq!(timeout_ms, 30000);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_pool_errors_are_store_unavailable() {
        let err: LookalikeError = sqlx::Error::PoolTimedOut.into();
        assert_eq!(err.kind(), "store_unavailable");
    }
}
