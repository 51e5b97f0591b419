use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// No backend could be loaded; callers treat this as "cannot embed".
    #[error("embedding backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("embedding model not found at path: {path}")]
    ModelNotFound { path: PathBuf },

    #[error("failed to load embedding model: {reason}")]
    ModelLoadFailed { reason: String },

    #[error("{device} device unavailable: {reason}")]
    DeviceUnavailable { device: String, reason: String },

    #[error("embedding inference failed: {reason}")]
    InferenceFailed { reason: String },

    #[error("tokenization failed: {reason}")]
    TokenizationFailed { reason: String },

    #[error("invalid embedding configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("backend produced {actual}-dim vectors, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding cache file error: {reason}")]
    CacheFile { reason: String },
}

pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

impl From<candle_core::Error> for EmbeddingError {
    fn from(err: candle_core::Error) -> Self {
        EmbeddingError::InferenceFailed {
            reason: err.to_string(),
        }
    }
}

impl From<std::io::Error> for EmbeddingError {
    fn from(err: std::io::Error) -> Self {
        EmbeddingError::ModelLoadFailed {
            reason: err.to_string(),
        }
    }
}
