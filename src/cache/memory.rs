//! In-process cache with lazy TTL expiry and strict LRU eviction.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use super::backend::CacheBackend;
use super::config::DEFAULT_MEMORY_SWEEP_INTERVAL;
use super::error::CacheResult;
use super::types::{BackendKind, BackendStats, CacheEntry, resolve_ttl, unix_now};

struct Slot {
    entry: CacheEntry,
    /// Monotonic access sequence; breaks `last_accessed` ties between same-instant accesses.
    seq: u64,
}

#[derive(Default)]
struct MemoryState {
    entries: HashMap<String, Slot>,
    next_seq: u64,
}

impl MemoryState {
    fn bump(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn evict_least_recently_used(&mut self) -> Option<String> {
        let victim = self
            .entries
            .iter()
            .min_by(|(_, a), (_, b)| {
                a.entry
                    .last_accessed
                    .total_cmp(&b.entry.last_accessed)
                    .then(a.seq.cmp(&b.seq))
            })
            .map(|(key, _)| key.clone())?;
        self.entries.remove(&victim);
        Some(victim)
    }
}

/// Bounded in-memory key-value store.
pub struct MemoryCache {
    state: Mutex<MemoryState>,
    max_size: usize,
    default_ttl: Duration,
    sweep_interval: Duration,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.len())
            .field("max_size", &self.max_size)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl MemoryCache {
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            max_size: max_size.max(1),
            default_ttl,
            sweep_interval: DEFAULT_MEMORY_SWEEP_INTERVAL,
        }
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a copy of the stored entry without recording an access.
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.state.lock().entries.get(key).map(|s| s.entry.clone())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.state.lock().entries.contains_key(key)
    }
}

impl CacheBackend for MemoryCache {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn get_entry(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let now = unix_now();
        let mut state = self.state.lock();

        let expired = match state.entries.get(key) {
            None => return Ok(None),
            Some(slot) => slot.entry.is_expired_at(now),
        };
        if expired {
            state.entries.remove(key);
            debug!(key, "Expired entry dropped on read");
            return Ok(None);
        }

        let seq = state.bump();
        let Some(slot) = state.entries.get_mut(key) else {
            return Ok(None);
        };
        slot.entry.touch_at(now);
        slot.seq = seq;
        Ok(Some(slot.entry.clone()))
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        let ttl = resolve_ttl(ttl, self.default_ttl)?;
        let now = unix_now();
        let mut state = self.state.lock();

        if !state.entries.contains_key(key)
            && state.entries.len() >= self.max_size
            && let Some(evicted) = state.evict_least_recently_used()
        {
            debug!(evicted = %evicted, max_size = self.max_size, "Evicted LRU entry");
        }

        let seq = state.bump();
        state.entries.insert(
            key.to_string(),
            Slot {
                entry: CacheEntry::new_at(key, value.to_vec(), ttl, now),
                seq,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> CacheResult<bool> {
        Ok(self.state.lock().entries.remove(key).is_some())
    }

    fn clear(&self) -> CacheResult<()> {
        self.state.lock().entries.clear();
        Ok(())
    }

    fn stats(&self) -> CacheResult<BackendStats> {
        let now = unix_now();
        let state = self.state.lock();
        let mut stats = BackendStats::new(BackendKind::Memory, self.max_size);
        stats.entries = state.entries.len();
        for slot in state.entries.values() {
            stats.total_accesses += slot.entry.access_count;
            if slot.entry.is_expired_at(now) {
                stats.expired_entries += 1;
            }
        }
        Ok(stats)
    }

    fn sweep_expired(&self) -> CacheResult<usize> {
        let now = unix_now();
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|_, slot| !slot.entry.is_expired_at(now));
        let removed = before - state.entries.len();
        if removed > 0 {
            debug!(removed, "Swept expired memory cache entries");
        }
        Ok(removed)
    }

    fn sweep_interval(&self) -> Option<Duration> {
        Some(self.sweep_interval)
    }
}
