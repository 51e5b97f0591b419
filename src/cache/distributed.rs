//! Distributed cache on Redis.
//!
//! Entries are stored as `rkyv`-encoded [`CacheEntry`] values under
//! `{prefix}entry:{key}` with a native `PX` expiry. Recency order lives in a sorted set
//! scored by a shared `INCR` counter, so every client agrees on which key is least recently
//! used. Access counts live in a hash, so a read never rewrites the stored value. Reads and
//! writes each run as one Lua script and are atomic against other clients. When the server
//! cannot be reached at construction time the backend runs on an in-process [`MemoryCache`]
//! instead.

use std::time::Duration;

use parking_lot::Mutex;
use redis::{Client, Connection, Script};
use tracing::{debug, info, warn};

use super::backend::CacheBackend;
use super::config::DEFAULT_MEMORY_SWEEP_INTERVAL;
use super::error::CacheResult;
use super::memory::MemoryCache;
use super::types::{BackendKind, BackendStats, CacheEntry, resolve_ttl, unix_now};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const SCAN_BATCH: usize = 500;

/// KEYS: entry, lru, seq, access. ARGV: member.
/// Returns `{value, access_count}` or nil.
const GET_SCRIPT: &str = r"
local data = redis.call('GET', KEYS[1])
if not data then
    redis.call('ZREM', KEYS[2], ARGV[1])
    redis.call('HDEL', KEYS[4], ARGV[1])
    return false
end
local seq = redis.call('INCR', KEYS[3])
redis.call('ZADD', KEYS[2], seq, ARGV[1])
local count = redis.call('HINCRBY', KEYS[4], ARGV[1], 1)
return {data, count}
";

/// KEYS: entry, lru, seq, access. ARGV: member, value, ttl ms, max size, entry prefix.
/// Returns the evicted member or nil.
const SET_SCRIPT: &str = r"
local evicted = false
if redis.call('EXISTS', KEYS[1]) == 0 then
    local max = tonumber(ARGV[4])
    while redis.call('ZCARD', KEYS[2]) >= max do
        local oldest = redis.call('ZRANGE', KEYS[2], 0, 0)
        if #oldest == 0 then
            break
        end
        local victim = oldest[1]
        redis.call('ZREM', KEYS[2], victim)
        redis.call('HDEL', KEYS[4], victim)
        if redis.call('DEL', ARGV[5] .. victim) == 1 then
            evicted = victim
            break
        end
    end
end
redis.call('SET', KEYS[1], ARGV[2], 'PX', ARGV[3])
redis.call('HSET', KEYS[4], ARGV[1], 0)
local seq = redis.call('INCR', KEYS[3])
redis.call('ZADD', KEYS[2], seq, ARGV[1])
return evicted
";

enum RedisState {
    Connected(Mutex<Connection>),
    Fallback(MemoryCache),
}

/// Redis-backed key-value store with an in-memory fallback.
pub struct RedisCache {
    state: RedisState,
    url: String,
    key_prefix: String,
    max_size: usize,
    default_ttl: Duration,
    get_script: Script,
    set_script: Script,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("url", &self.url)
            .field("key_prefix", &self.key_prefix)
            .field("fallback", &self.is_fallback())
            .field("max_size", &self.max_size)
            .finish()
    }
}

fn open_connection(url: &str) -> redis::RedisResult<Connection> {
    let client = Client::open(url)?;
    let mut conn = client.get_connection_with_timeout(CONNECT_TIMEOUT)?;
    redis::cmd("PING").query::<String>(&mut conn)?;
    Ok(conn)
}

impl RedisCache {
    /// Connects to `url`; falls back to an in-memory cache if the server is unreachable.
    pub fn connect(url: &str, key_prefix: &str, max_size: usize, default_ttl: Duration) -> Self {
        let state = match open_connection(url) {
            Ok(conn) => {
                info!(url, "Connected to redis cache");
                RedisState::Connected(Mutex::new(conn))
            }
            Err(e) => {
                warn!(url, error = %e, "Redis unavailable, falling back to memory cache");
                RedisState::Fallback(
                    MemoryCache::new(max_size, default_ttl)
                        .with_sweep_interval(DEFAULT_MEMORY_SWEEP_INTERVAL),
                )
            }
        };

        Self {
            state,
            url: url.to_string(),
            key_prefix: key_prefix.to_string(),
            max_size: max_size.max(1),
            default_ttl,
            get_script: Script::new(GET_SCRIPT),
            set_script: Script::new(SET_SCRIPT),
        }
    }

    /// Returns `true` when running on the in-memory fallback.
    pub fn is_fallback(&self) -> bool {
        matches!(self.state, RedisState::Fallback(_))
    }

    fn entry_prefix(&self) -> String {
        format!("{}entry:", self.key_prefix)
    }

    fn entry_key(&self, key: &str) -> String {
        format!("{}{}", self.entry_prefix(), key)
    }

    fn lru_key(&self) -> String {
        format!("{}meta:lru", self.key_prefix)
    }

    fn seq_key(&self) -> String {
        format!("{}meta:seq", self.key_prefix)
    }

    fn access_key(&self) -> String {
        format!("{}meta:access", self.key_prefix)
    }

    fn scan_entry_keys(&self, conn: &mut Connection) -> redis::RedisResult<Vec<String>> {
        let pattern = format!("{}*", self.entry_prefix());
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query(conn)?;
            keys.extend(batch);
            if next == 0 {
                return Ok(keys);
            }
            cursor = next;
        }
    }

    fn get_connected(&self, conn: &mut Connection, key: &str) -> CacheResult<Option<CacheEntry>> {
        let hit: Option<(Vec<u8>, u64)> = self
            .get_script
            .key(self.entry_key(key))
            .key(self.lru_key())
            .key(self.seq_key())
            .key(self.access_key())
            .arg(key)
            .invoke(conn)?;
        let Some((data, access_count)) = hit else {
            return Ok(None);
        };

        let now = unix_now();
        let mut entry = CacheEntry::from_bytes(&data)?;
        // PX has millisecond granularity; the entry's own clock is authoritative.
        if entry.is_expired_at(now) {
            return Ok(None);
        }
        entry.access_count = access_count;
        entry.last_accessed = now;
        Ok(Some(entry))
    }

    fn set_connected(
        &self,
        conn: &mut Connection,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> CacheResult<()> {
        let entry = CacheEntry::new(key, value.to_vec(), ttl);
        let evicted: Option<String> = self
            .set_script
            .key(self.entry_key(key))
            .key(self.lru_key())
            .key(self.seq_key())
            .key(self.access_key())
            .arg(key)
            .arg(entry.to_bytes()?)
            .arg(ttl.as_millis().max(1) as u64)
            .arg(self.max_size)
            .arg(self.entry_prefix())
            .invoke(conn)?;
        if let Some(evicted) = evicted {
            debug!(evicted = %evicted, max_size = self.max_size, "Evicted LRU entry");
        }
        Ok(())
    }
}

impl CacheBackend for RedisCache {
    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }

    fn get_entry(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        match &self.state {
            RedisState::Fallback(memory) => memory.get_entry(key),
            RedisState::Connected(conn) => self.get_connected(&mut conn.lock(), key),
        }
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        let ttl = resolve_ttl(ttl, self.default_ttl)?;
        match &self.state {
            RedisState::Fallback(memory) => memory.set(key, value, Some(ttl)),
            RedisState::Connected(conn) => self.set_connected(&mut conn.lock(), key, value, ttl),
        }
    }

    fn delete(&self, key: &str) -> CacheResult<bool> {
        match &self.state {
            RedisState::Fallback(memory) => memory.delete(key),
            RedisState::Connected(conn) => {
                let mut conn = conn.lock();
                let (removed,): (i64,) = redis::pipe()
                    .atomic()
                    .del(self.entry_key(key))
                    .zrem(self.lru_key(), key)
                    .ignore()
                    .hdel(self.access_key(), key)
                    .ignore()
                    .query(&mut *conn)?;
                Ok(removed > 0)
            }
        }
    }

    fn clear(&self) -> CacheResult<()> {
        match &self.state {
            RedisState::Fallback(memory) => memory.clear(),
            RedisState::Connected(conn) => {
                let mut conn = conn.lock();
                let keys = self.scan_entry_keys(&mut conn)?;
                for chunk in keys.chunks(SCAN_BATCH) {
                    redis::cmd("DEL").arg(chunk).query::<()>(&mut *conn)?;
                }
                redis::cmd("DEL")
                    .arg(self.lru_key())
                    .arg(self.seq_key())
                    .arg(self.access_key())
                    .query::<()>(&mut *conn)?;
                Ok(())
            }
        }
    }

    fn stats(&self) -> CacheResult<BackendStats> {
        match &self.state {
            RedisState::Fallback(memory) => {
                let mut stats = memory.stats()?;
                stats.kind = BackendKind::Redis;
                stats.fallback = true;
                Ok(stats)
            }
            RedisState::Connected(conn) => {
                let mut conn = conn.lock();
                let keys = self.scan_entry_keys(&mut conn)?;
                let counts: Vec<u64> = redis::cmd("HVALS")
                    .arg(self.access_key())
                    .query(&mut *conn)?;
                let mut stats = BackendStats::new(BackendKind::Redis, self.max_size);
                stats.entries = keys.len();
                stats.total_accesses = counts.iter().sum();
                Ok(stats)
            }
        }
    }

    fn sweep_expired(&self) -> CacheResult<usize> {
        match &self.state {
            RedisState::Fallback(memory) => memory.sweep_expired(),
            RedisState::Connected(conn) => {
                let mut conn = conn.lock();
                let tracked: Vec<String> = redis::cmd("ZRANGE")
                    .arg(self.lru_key())
                    .arg(0)
                    .arg(-1)
                    .query(&mut *conn)?;
                let mut pruned = 0;
                for key in tracked {
                    let exists: bool = redis::cmd("EXISTS")
                        .arg(self.entry_key(&key))
                        .query(&mut *conn)?;
                    if !exists {
                        redis::pipe()
                            .atomic()
                            .zrem(self.lru_key(), &key)
                            .ignore()
                            .hdel(self.access_key(), &key)
                            .ignore()
                            .query::<()>(&mut *conn)?;
                        pruned += 1;
                    }
                }
                Ok(pruned)
            }
        }
    }

    fn sweep_interval(&self) -> Option<Duration> {
        match &self.state {
            RedisState::Fallback(memory) => memory.sweep_interval(),
            RedisState::Connected(_) => None,
        }
    }
}
