//! Two-level cache: a small fast tier in front of a larger durable one.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use super::backend::CacheBackend;
use super::error::{CacheError, CacheResult};
use super::types::{BackendKind, BackendStats, CacheEntry, unix_now};

/// Reads L1 then L2, promoting L2 hits; writes go to both tiers.
///
/// L1 failures are logged and the operation continues against L2 alone.
pub struct TieredCache {
    l1: Arc<dyn CacheBackend>,
    l2: Arc<dyn CacheBackend>,
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("l1", &self.l1.kind())
            .field("l2", &self.l2.kind())
            .finish()
    }
}

impl TieredCache {
    pub fn new(l1: Arc<dyn CacheBackend>, l2: Arc<dyn CacheBackend>) -> Self {
        Self { l1, l2 }
    }

    pub fn l1(&self) -> &Arc<dyn CacheBackend> {
        &self.l1
    }

    pub fn l2(&self) -> &Arc<dyn CacheBackend> {
        &self.l2
    }
}

impl CacheBackend for TieredCache {
    fn kind(&self) -> BackendKind {
        BackendKind::Tiered
    }

    #[instrument(skip(self), level = "trace")]
    fn get_entry(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        match self.l1.get_entry(key) {
            Ok(Some(entry)) => return Ok(Some(entry)),
            Ok(None) => {}
            Err(e) => warn!(key, error = %e, "L1 read failed, falling through to L2"),
        }

        let Some(entry) = self.l2.get_entry(key)? else {
            return Ok(None);
        };

        // A promoted copy never outlives the L2 entry.
        let Some(remaining) = entry.remaining_ttl_at(unix_now()) else {
            return Ok(Some(entry));
        };
        match self.l1.set(key, &entry.value, Some(remaining)) {
            Ok(()) => debug!(key, "Promoted L2 hit into L1"),
            Err(e) => warn!(key, error = %e, "L1 promotion failed"),
        }
        Ok(Some(entry))
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        match self.l1.set(key, value, ttl) {
            Ok(()) => {}
            Err(CacheError::InvalidTtl) => return Err(CacheError::InvalidTtl),
            Err(e) => warn!(key, error = %e, "L1 write failed, writing L2 only"),
        }
        self.l2.set(key, value, ttl)
    }

    fn delete(&self, key: &str) -> CacheResult<bool> {
        let in_l1 = self.l1.delete(key).unwrap_or_else(|e| {
            warn!(key, error = %e, "L1 delete failed");
            false
        });
        let in_l2 = self.l2.delete(key)?;
        Ok(in_l1 || in_l2)
    }

    fn clear(&self) -> CacheResult<()> {
        if let Err(e) = self.l1.clear() {
            warn!(error = %e, "L1 clear failed");
        }
        self.l2.clear()
    }

    fn stats(&self) -> CacheResult<BackendStats> {
        let l1 = self.l1.stats()?;
        let l2 = self.l2.stats()?;

        let mut stats = BackendStats::new(BackendKind::Tiered, l1.max_size + l2.max_size);
        stats.entries = l1.entries + l2.entries;
        stats.expired_entries = l1.expired_entries + l2.expired_entries;
        stats.total_accesses = l1.total_accesses + l2.total_accesses;
        stats.fallback = l1.fallback || l2.fallback;
        stats.tiers = vec![l1, l2];
        Ok(stats)
    }

    fn sweep_expired(&self) -> CacheResult<usize> {
        Ok(self.l1.sweep_expired()? + self.l2.sweep_expired()?)
    }

    fn sweep_interval(&self) -> Option<Duration> {
        None
    }

    fn tiers(&self) -> Vec<Arc<dyn CacheBackend>> {
        vec![Arc::clone(&self.l1), Arc::clone(&self.l2)]
    }
}
