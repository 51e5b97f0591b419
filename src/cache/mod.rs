//! Key-value caches with TTL expiry and LRU bounds.
//!
//! Backends implement [`CacheBackend`]: [`MemoryCache`] (in-process), [`SqliteCache`]
//! (single file, survives restarts), [`RedisCache`] (shared, native TTL) and
//! [`TieredCache`] (two of the above stacked). [`CacheManager`] adds hit/miss accounting
//! and typed JSON access on top of whichever backend [`build_backend`] produced.

pub mod backend;
pub mod config;
pub mod distributed;
pub mod error;
pub mod manager;
pub mod memory;
pub mod sqlite;
pub mod tiered;
pub mod types;

#[cfg(test)]
mod distributed_tests;
#[cfg(test)]
mod manager_tests;
#[cfg(test)]
mod memory_tests;
#[cfg(test)]
mod test_support;

pub use backend::{CacheBackend, build_backend};
pub use config::{
    CacheBackendConfig, CacheBackendKind, CacheConfig, DEFAULT_L1_MAX_SIZE,
    DEFAULT_MEMORY_SWEEP_INTERVAL, DEFAULT_REDIS_KEY_PREFIX, DEFAULT_SQLITE_SWEEP_INTERVAL,
};
pub use distributed::RedisCache;
pub use error::{CacheError, CacheResult};
pub use manager::{CacheManager, CacheMetrics, CacheReport};
pub use memory::MemoryCache;
pub use sqlite::SqliteCache;
pub use tiered::TieredCache;
pub use types::{BackendKind, BackendStats, CacheEntry, unix_now};
