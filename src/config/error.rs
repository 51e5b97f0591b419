//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric environment variable could not be parsed.
    #[error("failed to parse {name}='{value}': {source}")]
    InvalidNumber {
        name: &'static str,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    /// A numeric setting that must be positive was zero.
    #[error("{name} must be greater than zero")]
    ZeroValue { name: &'static str },

    /// Unknown cache backend name.
    #[error("unknown cache backend '{value}' (expected memory|sqlite|redis|tiered|tiered-redis)")]
    InvalidCacheBackend { value: String },

    /// Stage-1 recall must be at least as large as the final result count.
    #[error("initial_top_k ({initial}) must be >= final_top_k ({final_k})")]
    InvalidTopK { initial: usize, final_k: usize },

    /// Specified path does not exist on the filesystem.
    #[error("path does not exist: {path}")]
    PathNotFound { path: PathBuf },

    /// Path exists but is not a directory (when a directory was expected).
    #[error("path is not a directory: {path}")]
    NotADirectory { path: PathBuf },
}
