use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::config::{CacheBackendConfig, CacheConfig};
use super::distributed::RedisCache;
use super::error::CacheResult;
use super::memory::MemoryCache;
use super::sqlite::SqliteCache;
use super::tiered::TieredCache;
use super::types::{BackendKind, BackendStats, CacheEntry};

/// Key-value store with TTL expiry and bounded size.
///
/// Values are opaque bytes; [`super::CacheManager`] layers typed JSON access on top.
/// Implementations must never hold more than their configured max entries once a `set`
/// returns.
pub trait CacheBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Returns the entry if present and unexpired, recording one access.
    ///
    /// The returned copy already reflects that access.
    fn get_entry(&self, key: &str) -> CacheResult<Option<CacheEntry>>;

    /// Returns the value if present and unexpired, recording one access.
    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.get_entry(key)?.map(|entry| entry.value))
    }

    /// Inserts or replaces `key`. `None` uses the backend's default TTL.
    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()>;

    /// Returns `true` if an entry was removed.
    fn delete(&self, key: &str) -> CacheResult<bool>;

    fn clear(&self) -> CacheResult<()>;

    fn stats(&self) -> CacheResult<BackendStats>;

    /// Drops expired entries and returns how many were removed.
    fn sweep_expired(&self) -> CacheResult<usize>;

    /// How often the sweeper should call [`CacheBackend::sweep_expired`].
    /// `None` when the store expires keys itself.
    fn sweep_interval(&self) -> Option<Duration>;

    /// Child backends of a composite, swept on their own schedules.
    fn tiers(&self) -> Vec<Arc<dyn CacheBackend>> {
        Vec::new()
    }
}

/// Builds the backend graph described by `config`.
pub fn build_backend(config: &CacheConfig) -> CacheResult<Arc<dyn CacheBackend>> {
    config.validate()?;
    let backend = build_node(&config.backend, config.max_size, config)?;
    info!(
        kind = %backend.kind(),
        max_size = config.max_size,
        default_ttl_secs = config.default_ttl.as_secs_f64(),
        "Cache backend ready"
    );
    Ok(backend)
}

fn build_node(
    node: &CacheBackendConfig,
    max_size: usize,
    config: &CacheConfig,
) -> CacheResult<Arc<dyn CacheBackend>> {
    Ok(match node {
        CacheBackendConfig::Memory => Arc::new(
            MemoryCache::new(max_size, config.default_ttl)
                .with_sweep_interval(config.memory_sweep_interval),
        ),
        CacheBackendConfig::Sqlite { path } => Arc::new(
            SqliteCache::open(path, max_size, config.default_ttl)?
                .with_sweep_interval(config.sqlite_sweep_interval),
        ),
        CacheBackendConfig::Redis { url, key_prefix } => Arc::new(RedisCache::connect(
            url,
            key_prefix,
            max_size,
            config.default_ttl,
        )),
        CacheBackendConfig::Tiered {
            l1,
            l2,
            l1_max_size,
        } => {
            let l1 = build_node(l1, *l1_max_size, config)?;
            let l2 = build_node(l2, max_size, config)?;
            Arc::new(TieredCache::new(l1, l2))
        }
    })
}
