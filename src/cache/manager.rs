//! Counting facade over any [`CacheBackend`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::backend::CacheBackend;
use super::error::{CacheError, CacheResult};
use super::types::BackendStats;

/// Request counters since construction (or the last [`CacheManager::reset_metrics`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
    pub hit_rate: f64,
}

/// Counters plus a backend snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub metrics: CacheMetrics,
    /// `None` when the backend failed to report.
    pub backend: Option<BackendStats>,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
}

/// Wraps a backend, counts every request and turns backend failures into misses.
///
/// The only error that reaches callers is [`CacheError::InvalidTtl`]; everything else is
/// logged, counted and degraded so that a broken cache never fails a query.
pub struct CacheManager {
    backend: Arc<dyn CacheBackend>,
    counters: Counters,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("backend", &self.backend.kind())
            .field("metrics", &self.metrics())
            .finish()
    }
}

impl CacheManager {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            counters: Counters::default(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    fn record_error(&self, op: &'static str, key: &str, err: &CacheError) {
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
        warn!(op, key, backend = %self.backend.kind(), error = %err, "Cache backend error");
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.backend.get(key) {
            Ok(Some(value)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                self.record_error("get", key, &e);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Returns `Ok(false)` if the backend failed; `Err` only for a zero TTL.
    pub fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<bool> {
        match self.backend.set(key, value, ttl) {
            Ok(()) => {
                self.counters.sets.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            }
            Err(CacheError::InvalidTtl) => Err(CacheError::InvalidTtl),
            Err(e) => {
                self.record_error("set", key, &e);
                Ok(false)
            }
        }
    }

    pub fn delete(&self, key: &str) -> bool {
        match self.backend.delete(key) {
            Ok(removed) => {
                self.counters.deletes.fetch_add(1, Ordering::Relaxed);
                removed
            }
            Err(e) => {
                self.record_error("delete", key, &e);
                false
            }
        }
    }

    pub fn clear(&self) -> bool {
        match self.backend.clear() {
            Ok(()) => true,
            Err(e) => {
                self.record_error("clear", "*", &e);
                false
            }
        }
    }

    /// Typed read. A value that no longer decodes counts as a miss and is dropped.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.get(key)?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(key, error = %e, "Dropping undecodable cached value");
                self.counters.hits.fetch_sub(1, Ordering::Relaxed);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = self.backend.delete(key) {
                    self.record_error("delete", key, &e);
                }
                None
            }
        }
    }

    pub fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<bool> {
        let bytes = serde_json::to_vec(value)?;
        self.set(key, &bytes, ttl)
    }

    pub fn metrics(&self) -> CacheMetrics {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let requests = hits + misses;
        CacheMetrics {
            hits,
            misses,
            sets: self.counters.sets.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            hit_rate: if requests == 0 {
                0.0
            } else {
                hits as f64 / requests as f64
            },
        }
    }

    pub fn hit_rate(&self) -> f64 {
        self.metrics().hit_rate
    }

    pub fn reset_metrics(&self) {
        self.counters.hits.store(0, Ordering::Relaxed);
        self.counters.misses.store(0, Ordering::Relaxed);
        self.counters.sets.store(0, Ordering::Relaxed);
        self.counters.deletes.store(0, Ordering::Relaxed);
        self.counters.errors.store(0, Ordering::Relaxed);
    }

    pub fn report(&self) -> CacheReport {
        let backend = match self.backend.stats() {
            Ok(stats) => Some(stats),
            Err(e) => {
                self.record_error("stats", "*", &e);
                None
            }
        };
        CacheReport {
            metrics: self.metrics(),
            backend,
        }
    }
}
