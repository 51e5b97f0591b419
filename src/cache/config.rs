use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{CacheError, CacheResult};
use crate::constants::{DEFAULT_CACHE_MAX_SIZE, DEFAULT_CACHE_TTL_SECS};

/// Sweep cadence for the in-memory backend.
pub const DEFAULT_MEMORY_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Sweep cadence for the embedded (SQLite) backend.
pub const DEFAULT_SQLITE_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

/// Max entries of the first tier in a two-level cache.
pub const DEFAULT_L1_MAX_SIZE: usize = 1000;

/// Key namespace used in the distributed store.
pub const DEFAULT_REDIS_KEY_PREFIX: &str = "factlens:";

fn default_l1_max_size() -> usize {
    DEFAULT_L1_MAX_SIZE
}

fn default_key_prefix() -> String {
    DEFAULT_REDIS_KEY_PREFIX.to_string()
}

/// Backend names accepted by `FACTLENS_CACHE_BACKEND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackendKind {
    Memory,
    Sqlite,
    Redis,
    /// Memory in front of SQLite.
    Tiered,
    /// Memory in front of Redis.
    TieredRedis,
}

impl FromStr for CacheBackendKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            "redis" => Ok(Self::Redis),
            "tiered" | "multi_level" => Ok(Self::Tiered),
            "tiered-redis" => Ok(Self::TieredRedis),
            other => Err(CacheError::InvalidConfig {
                reason: format!("unknown cache backend '{other}'"),
            }),
        }
    }
}

/// Shape of the backend graph to build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheBackendConfig {
    Memory,
    Sqlite {
        path: PathBuf,
    },
    Redis {
        url: String,
        #[serde(default = "default_key_prefix")]
        key_prefix: String,
    },
    Tiered {
        l1: Box<CacheBackendConfig>,
        l2: Box<CacheBackendConfig>,
        #[serde(default = "default_l1_max_size")]
        l1_max_size: usize,
    },
}

impl CacheBackendConfig {
    pub fn redis(url: impl Into<String>) -> Self {
        Self::Redis {
            url: url.into(),
            key_prefix: default_key_prefix(),
        }
    }

    pub fn tiered(l1: CacheBackendConfig, l2: CacheBackendConfig) -> Self {
        Self::Tiered {
            l1: Box::new(l1),
            l2: Box::new(l2),
            l1_max_size: DEFAULT_L1_MAX_SIZE,
        }
    }
}

/// Cache construction parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub backend: CacheBackendConfig,
    /// TTL applied when `set` is called without one.
    pub default_ttl: Duration,
    /// Max entries per leaf backend (the first tier of a two-level cache uses its own limit).
    pub max_size: usize,
    pub memory_sweep_interval: Duration,
    pub sqlite_sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendConfig::Memory,
            default_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            max_size: DEFAULT_CACHE_MAX_SIZE,
            memory_sweep_interval: DEFAULT_MEMORY_SWEEP_INTERVAL,
            sqlite_sweep_interval: DEFAULT_SQLITE_SWEEP_INTERVAL,
        }
    }
}

impl CacheConfig {
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: CacheBackendConfig::Sqlite { path: path.into() },
            ..Default::default()
        }
    }

    /// Maps a backend name onto a concrete backend graph.
    pub fn for_kind(kind: CacheBackendKind, sqlite_path: PathBuf, redis_url: &str) -> Self {
        let backend = match kind {
            CacheBackendKind::Memory => CacheBackendConfig::Memory,
            CacheBackendKind::Sqlite => CacheBackendConfig::Sqlite { path: sqlite_path },
            CacheBackendKind::Redis => CacheBackendConfig::redis(redis_url),
            CacheBackendKind::Tiered => CacheBackendConfig::tiered(
                CacheBackendConfig::Memory,
                CacheBackendConfig::Sqlite { path: sqlite_path },
            ),
            CacheBackendKind::TieredRedis => CacheBackendConfig::tiered(
                CacheBackendConfig::Memory,
                CacheBackendConfig::redis(redis_url),
            ),
        };
        Self {
            backend,
            ..Default::default()
        }
    }

    pub fn with_backend(mut self, backend: CacheBackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_sweep_intervals(mut self, memory: Duration, sqlite: Duration) -> Self {
        self.memory_sweep_interval = memory;
        self.sqlite_sweep_interval = sqlite;
        self
    }

    pub fn validate(&self) -> CacheResult<()> {
        if self.default_ttl.is_zero() {
            return Err(CacheError::InvalidTtl);
        }
        if self.max_size == 0 {
            return Err(CacheError::InvalidConfig {
                reason: "max_size must be > 0".to_string(),
            });
        }
        if self.memory_sweep_interval.is_zero() || self.sqlite_sweep_interval.is_zero() {
            return Err(CacheError::InvalidConfig {
                reason: "sweep intervals must be > 0".to_string(),
            });
        }
        Self::validate_backend(&self.backend)
    }

    fn validate_backend(backend: &CacheBackendConfig) -> CacheResult<()> {
        match backend {
            CacheBackendConfig::Memory => Ok(()),
            CacheBackendConfig::Sqlite { path } if path.as_os_str().is_empty() => {
                Err(CacheError::InvalidConfig {
                    reason: "sqlite path cannot be empty".to_string(),
                })
            }
            CacheBackendConfig::Sqlite { .. } => Ok(()),
            CacheBackendConfig::Redis { url, .. } if url.trim().is_empty() => {
                Err(CacheError::InvalidConfig {
                    reason: "redis url cannot be empty".to_string(),
                })
            }
            CacheBackendConfig::Redis { .. } => Ok(()),
            CacheBackendConfig::Tiered {
                l1,
                l2,
                l1_max_size,
            } => {
                if *l1_max_size == 0 {
                    return Err(CacheError::InvalidConfig {
                        reason: "l1_max_size must be > 0".to_string(),
                    });
                }
                if matches!(**l1, CacheBackendConfig::Tiered { .. })
                    || matches!(**l2, CacheBackendConfig::Tiered { .. })
                {
                    return Err(CacheError::InvalidConfig {
                        reason: "tiers cannot themselves be tiered".to_string(),
                    });
                }
                Self::validate_backend(l1)?;
                Self::validate_backend(l2)
            }
        }
    }
}
