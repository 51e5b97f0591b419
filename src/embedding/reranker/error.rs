use std::path::PathBuf;
use thiserror::Error;

use crate::embedding::error::EmbeddingError;

#[derive(Debug, Error)]
pub enum RerankerError {
    /// No cross-encoder loaded. `rerank` turns this into a passthrough.
    #[error("reranker not available: {reason}")]
    NotAvailable { reason: String },

    #[error("reranker model not found at path: {path}")]
    ModelNotFound { path: PathBuf },

    #[error("failed to load reranker model: {reason}")]
    ModelLoadFailed { reason: String },

    #[error("{device} device unavailable: {reason}")]
    DeviceUnavailable { device: String, reason: String },

    #[error("reranker inference failed: {reason}")]
    InferenceFailed { reason: String },

    /// The scorer returned a different number of logits than passages.
    #[error("scorer returned {actual} scores for {expected} passages")]
    ScoreCountMismatch { expected: usize, actual: usize },

    #[error("tokenization failed: {reason}")]
    TokenizationFailed { reason: String },

    #[error("invalid reranker configuration: {reason}")]
    InvalidConfig { reason: String },
}

pub type RerankerResult<T> = Result<T, RerankerError>;

impl From<candle_core::Error> for RerankerError {
    fn from(err: candle_core::Error) -> Self {
        RerankerError::InferenceFailed {
            reason: err.to_string(),
        }
    }
}

impl From<EmbeddingError> for RerankerError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::DeviceUnavailable { device, reason } => {
                RerankerError::DeviceUnavailable { device, reason }
            }
            EmbeddingError::TokenizationFailed { reason } => {
                RerankerError::TokenizationFailed { reason }
            }
            _ => RerankerError::InferenceFailed {
                reason: err.to_string(),
            },
        }
    }
}
