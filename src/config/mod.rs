//! Environment-backed configuration.
//!
//! Most settings have defaults. Override with `FACTLENS_*` environment variables.

pub mod error;


pub use error::ConfigError;

use std::env;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{CacheBackendKind, CacheConfig};
use crate::constants::{
    DEFAULT_CACHE_MAX_SIZE, DEFAULT_CACHE_TTL_SECS, DEFAULT_EMBEDDING_DIM, DEFAULT_FINAL_TOP_K,
    DEFAULT_INITIAL_TOP_K,
};

/// Engine configuration loaded from environment variables.
///
/// Use [`Config::from_env`] to read `FACTLENS_*` overrides on top of defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for the index snapshot, embedding cache and embedded cache db.
    /// Default: `./.data`.
    pub data_dir: PathBuf,

    /// Sentence-encoder model directory (BERT + tokenizer). `None` runs the hashing embedder.
    pub embedding_model_path: Option<PathBuf>,

    /// Cross-encoder model directory (BERT + tokenizer). `None` runs the lexical scorer.
    pub reranker_path: Option<PathBuf>,

    /// Embedding dimension shared by provider and index. Default: `384`.
    pub embedding_dim: usize,

    /// Which cache backend fronts query results. Default: `memory`.
    pub cache_backend: CacheBackendKind,

    /// Redis endpoint for the distributed backend. Default: `redis://127.0.0.1:6379`.
    pub redis_url: String,

    /// Max entries per cache backend. Default: `10_000`.
    pub cache_max_size: usize,

    /// Default TTL for cached query results, in seconds. Default: `3600`.
    pub cache_ttl_secs: u64,

    /// Stage-1 candidate count. Default: `50`.
    pub initial_top_k: usize,

    /// Final result count. Default: `10`.
    pub final_top_k: usize,
}

/// Default Redis URL used when `FACTLENS_REDIS_URL` is not set.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./.data"),
            embedding_model_path: None,
            reranker_path: None,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            cache_backend: CacheBackendKind::Memory,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            cache_max_size: DEFAULT_CACHE_MAX_SIZE,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            initial_top_k: DEFAULT_INITIAL_TOP_K,
            final_top_k: DEFAULT_FINAL_TOP_K,
        }
    }
}

impl Config {
    const ENV_DATA_DIR: &'static str = "FACTLENS_DATA_DIR";
    const ENV_EMBEDDING_MODEL_PATH: &'static str = "FACTLENS_EMBEDDING_MODEL_PATH";
    const ENV_RERANKER_PATH: &'static str = "FACTLENS_RERANKER_PATH";
    const ENV_EMBEDDING_DIM: &'static str = "FACTLENS_EMBEDDING_DIM";
    const ENV_CACHE_BACKEND: &'static str = "FACTLENS_CACHE_BACKEND";
    const ENV_REDIS_URL: &'static str = "FACTLENS_REDIS_URL";
    const ENV_CACHE_MAX_SIZE: &'static str = "FACTLENS_CACHE_MAX_SIZE";
    const ENV_CACHE_TTL_SECS: &'static str = "FACTLENS_CACHE_TTL_SECS";
    const ENV_INITIAL_TOP_K: &'static str = "FACTLENS_INITIAL_TOP_K";
    const ENV_FINAL_TOP_K: &'static str = "FACTLENS_FINAL_TOP_K";

    /// Loads configuration from environment variables (falling back to defaults).
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let data_dir = Self::parse_path_from_env(Self::ENV_DATA_DIR, defaults.data_dir);
        let embedding_model_path =
            Self::parse_optional_path_from_env(Self::ENV_EMBEDDING_MODEL_PATH);
        let reranker_path = Self::parse_optional_path_from_env(Self::ENV_RERANKER_PATH);
        let embedding_dim =
            Self::parse_number_from_env(Self::ENV_EMBEDDING_DIM, defaults.embedding_dim)?;
        let cache_backend = match env::var(Self::ENV_CACHE_BACKEND) {
            Ok(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidCacheBackend { value })?,
            Err(_) => defaults.cache_backend,
        };
        let redis_url = Self::parse_string_from_env(Self::ENV_REDIS_URL, defaults.redis_url);
        let cache_max_size =
            Self::parse_number_from_env(Self::ENV_CACHE_MAX_SIZE, defaults.cache_max_size)?;
        let cache_ttl_secs =
            Self::parse_number_from_env(Self::ENV_CACHE_TTL_SECS, defaults.cache_ttl_secs)?;
        let initial_top_k =
            Self::parse_number_from_env(Self::ENV_INITIAL_TOP_K, defaults.initial_top_k)?;
        let final_top_k =
            Self::parse_number_from_env(Self::ENV_FINAL_TOP_K, defaults.final_top_k)?;

        Ok(Self {
            data_dir,
            embedding_model_path,
            reranker_path,
            embedding_dim,
            cache_backend,
            redis_url,
            cache_max_size,
            cache_ttl_secs,
            initial_top_k,
            final_top_k,
        })
    }

    /// Validates model paths and numeric invariants (does not create directories).
    pub fn validate(&self) -> Result<(), ConfigError> {
        for path in [&self.embedding_model_path, &self.reranker_path]
            .into_iter()
            .flatten()
        {
            if !path.exists() {
                return Err(ConfigError::PathNotFound { path: path.clone() });
            }
            if !path.is_dir() {
                return Err(ConfigError::NotADirectory { path: path.clone() });
            }
        }

        if self.embedding_dim == 0 {
            return Err(ConfigError::ZeroValue {
                name: Self::ENV_EMBEDDING_DIM,
            });
        }
        if self.cache_max_size == 0 {
            return Err(ConfigError::ZeroValue {
                name: Self::ENV_CACHE_MAX_SIZE,
            });
        }
        if self.cache_ttl_secs == 0 {
            return Err(ConfigError::ZeroValue {
                name: Self::ENV_CACHE_TTL_SECS,
            });
        }
        if self.final_top_k == 0 {
            return Err(ConfigError::ZeroValue {
                name: Self::ENV_FINAL_TOP_K,
            });
        }
        if self.initial_top_k < self.final_top_k {
            return Err(ConfigError::InvalidTopK {
                initial: self.initial_top_k,
                final_k: self.final_top_k,
            });
        }

        Ok(())
    }

    /// Directory holding `index.bin` + `metadata.json`.
    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("index")
    }

    /// Persistent embedding cache file.
    pub fn embedding_cache_path(&self) -> PathBuf {
        self.data_dir.join("embeddings.rkyv")
    }

    /// Embedded (SQLite) cache database file.
    pub fn sqlite_cache_path(&self) -> PathBuf {
        self.data_dir.join("cache.sqlite3")
    }

    /// Builds the cache configuration for the selected backend.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::for_kind(
            self.cache_backend,
            self.sqlite_cache_path(),
            &self.redis_url,
        )
        .with_max_size(self.cache_max_size)
        .with_default_ttl(Duration::from_secs(self.cache_ttl_secs))
    }

    fn parse_path_from_env(var_name: &str, default: PathBuf) -> PathBuf {
        env::var(var_name).map(PathBuf::from).unwrap_or(default)
    }

    fn parse_optional_path_from_env(var_name: &str) -> Option<PathBuf> {
        env::var(var_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }

    fn parse_string_from_env(var_name: &str, default: String) -> String {
        env::var(var_name).unwrap_or(default)
    }

    fn parse_number_from_env<T>(name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr<Err = ParseIntError>,
    {
        match env::var(name) {
            Ok(value) => value
                .trim()
                .parse()
                .map_err(|source| ConfigError::InvalidNumber {
                    name,
                    value,
                    source,
                }),
            Err(_) => Ok(default),
        }
    }
}
