use std::time::Duration;

use super::backend::CacheBackend;
use super::error::{CacheError, CacheResult};
use super::memory::MemoryCache;
use super::types::{BackendKind, BackendStats, CacheEntry};

/// Backend whose every operation fails.
pub(super) struct BrokenBackend;

pub(super) fn broken() -> CacheError {
    CacheError::Io(std::io::Error::other("disk on fire"))
}

impl CacheBackend for BrokenBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }
    fn get_entry(&self, _key: &str) -> CacheResult<Option<CacheEntry>> {
        Err(broken())
    }
    fn set(&self, _key: &str, _value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        if ttl == Some(Duration::ZERO) {
            return Err(CacheError::InvalidTtl);
        }
        Err(broken())
    }
    fn delete(&self, _key: &str) -> CacheResult<bool> {
        Err(broken())
    }
    fn clear(&self) -> CacheResult<()> {
        Err(broken())
    }
    fn stats(&self) -> CacheResult<BackendStats> {
        Err(broken())
    }
    fn sweep_expired(&self) -> CacheResult<usize> {
        Err(broken())
    }
    fn sweep_interval(&self) -> Option<Duration> {
        None
    }
}

/// Memory-backed store whose deletes always fail.
pub(super) struct UndeletableBackend(pub(super) MemoryCache);

impl CacheBackend for UndeletableBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }
    fn get_entry(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        self.0.get_entry(key)
    }
    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        self.0.set(key, value, ttl)
    }
    fn delete(&self, _key: &str) -> CacheResult<bool> {
        Err(broken())
    }
    fn clear(&self) -> CacheResult<()> {
        self.0.clear()
    }
    fn stats(&self) -> CacheResult<BackendStats> {
        self.0.stats()
    }
    fn sweep_expired(&self) -> CacheResult<usize> {
        self.0.sweep_expired()
    }
    fn sweep_interval(&self) -> Option<Duration> {
        None
    }
}
