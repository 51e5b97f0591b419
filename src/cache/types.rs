use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rkyv::rancor::Error as RkyvError;
use rkyv::util::AlignedVec;
use serde::{Deserialize, Serialize};

use super::error::{CacheError, CacheResult};

/// Current wall-clock time as fractional unix seconds.
#[inline]
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Resolves an optional per-call TTL against a backend default.
///
/// `None` means "use the default"; an explicit zero is rejected.
pub(crate) fn resolve_ttl(ttl: Option<Duration>, default_ttl: Duration) -> CacheResult<Duration> {
    let ttl = ttl.unwrap_or(default_ttl);
    if ttl.is_zero() {
        return Err(CacheError::InvalidTtl);
    }
    Ok(ttl)
}

/// A cached value with expiry and access bookkeeping.
///
/// Stored as `rkyv` bytes by the distributed backend.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Serialize,
    Deserialize,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
pub struct CacheEntry {
    pub key: String,
    pub value: Vec<u8>,
    /// Unix seconds.
    pub created_at: f64,
    pub ttl_secs: f64,
    pub access_count: u64,
    /// Unix seconds.
    pub last_accessed: f64,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, value: Vec<u8>, ttl: Duration) -> Self {
        Self::new_at(key, value, ttl, unix_now())
    }

    pub fn new_at(key: impl Into<String>, value: Vec<u8>, ttl: Duration, now: f64) -> Self {
        Self {
            key: key.into(),
            value,
            created_at: now,
            ttl_secs: ttl.as_secs_f64(),
            access_count: 0,
            last_accessed: now,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs_f64(self.ttl_secs.max(0.0))
    }

    /// Expired once strictly more than `ttl` has elapsed since creation.
    #[inline]
    pub fn is_expired_at(&self, now: f64) -> bool {
        now - self.created_at > self.ttl_secs
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_now())
    }

    /// Records one read.
    #[inline]
    pub fn touch_at(&mut self, now: f64) {
        self.access_count += 1;
        self.last_accessed = now;
    }

    /// Remaining lifetime, or `None` once expired.
    pub fn remaining_ttl_at(&self, now: f64) -> Option<Duration> {
        let remaining = self.created_at + self.ttl_secs - now;
        (remaining > 0.0).then(|| Duration::from_secs_f64(remaining))
    }

    pub fn to_bytes(&self) -> CacheResult<Vec<u8>> {
        let bytes = rkyv::to_bytes::<RkyvError>(self).map_err(|e| CacheError::Codec {
            reason: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }

    /// Decodes bytes produced by [`CacheEntry::to_bytes`]. The input need not be aligned.
    pub fn from_bytes(bytes: &[u8]) -> CacheResult<Self> {
        let mut aligned = AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<Self, RkyvError>(&aligned).map_err(|e| CacheError::Codec {
            reason: e.to_string(),
        })
    }
}

/// Which storage family a backend belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Memory,
    Sqlite,
    Redis,
    Tiered,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Sqlite => "sqlite",
            BackendKind::Redis => "redis",
            BackendKind::Tiered => "tiered",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time statistics for one backend (and its tiers, for composites).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendStats {
    pub kind: BackendKind,
    pub entries: usize,
    pub max_size: usize,
    /// Entries past their TTL that have not been swept yet.
    pub expired_entries: usize,
    pub total_accesses: u64,
    /// Set when a distributed backend is running on its in-memory fallback.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tiers: Vec<BackendStats>,
}

impl BackendStats {
    pub fn new(kind: BackendKind, max_size: usize) -> Self {
        Self {
            kind,
            entries: 0,
            max_size,
            expired_entries: 0,
            total_accesses: 0,
            fallback: false,
            tiers: Vec::new(),
        }
    }
}
