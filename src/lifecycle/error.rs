use thiserror::Error;

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::embedding::{EmbeddingError, RerankerError};
use crate::index::IndexError;

#[derive(Error, Debug)]
/// Errors returned while building, running or stopping an [`Engine`](super::Engine).
pub enum LifecycleError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Settings(#[from] ConfigError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Reranker(#[from] RerankerError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Background tasks need a running tokio runtime.
    #[error("no tokio runtime available to start background tasks")]
    NoRuntime,

    #[error("engine has been shut down")]
    ShutDown,
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
