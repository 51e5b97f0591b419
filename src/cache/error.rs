use thiserror::Error;

#[derive(Debug, Error)]
/// Errors returned by cache backends.
pub enum CacheError {
    /// A zero TTL was passed to `set`.
    #[error("ttl must be greater than zero")]
    InvalidTtl,

    /// Invalid backend configuration.
    #[error("invalid cache configuration: {reason}")]
    InvalidConfig {
        /// Error message.
        reason: String,
    },

    /// Embedded store failure.
    #[error("sqlite cache error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Distributed store failure.
    #[error("redis cache error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Binary entry encoding failure.
    #[error("cache entry codec error: {reason}")]
    Codec {
        /// Error message.
        reason: String,
    },

    /// Value (de)serialization failure.
    #[error("cache value serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
