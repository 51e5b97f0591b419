//! Single-file embedded cache backed by SQLite.
//!
//! Same expiry and eviction rules as [`super::MemoryCache`], but entries survive a restart.
//! Every read-modify-write runs inside one `IMMEDIATE` transaction, so the size bound holds
//! even if several handles share the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use tracing::{debug, info};

use super::backend::CacheBackend;
use super::config::DEFAULT_SQLITE_SWEEP_INTERVAL;
use super::error::CacheResult;
use super::types::{BackendKind, BackendStats, CacheEntry, resolve_ttl, unix_now};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS cache (
        key TEXT PRIMARY KEY,
        value BLOB NOT NULL,
        created_at REAL NOT NULL,
        ttl_seconds REAL NOT NULL,
        access_count INTEGER NOT NULL DEFAULT 0,
        last_accessed REAL NOT NULL,
        access_seq INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_cache_lru ON cache (last_accessed, access_seq);
    CREATE TABLE IF NOT EXISTS cache_seq (
        id INTEGER PRIMARY KEY CHECK (id = 0),
        value INTEGER NOT NULL
    );
    INSERT OR IGNORE INTO cache_seq (id, value)
        SELECT 0, COALESCE(MAX(access_seq), 0) FROM cache;
";

const ENTRY_COLUMNS: &str = "key, value, created_at, ttl_seconds, access_count, last_accessed";

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<CacheEntry> {
    Ok(CacheEntry {
        key: row.get(0)?,
        value: row.get(1)?,
        created_at: row.get(2)?,
        ttl_secs: row.get(3)?,
        access_count: row.get::<_, i64>(4)? as u64,
        last_accessed: row.get(5)?,
    })
}

/// Bounded on-disk key-value store.
pub struct SqliteCache {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    max_size: usize,
    default_ttl: Duration,
    sweep_interval: Duration,
}

impl std::fmt::Debug for SqliteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCache")
            .field("path", &self.path)
            .field("max_size", &self.max_size)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl SqliteCache {
    /// Opens (or creates) the cache database at `path`.
    pub fn open(
        path: impl AsRef<Path>,
        max_size: usize,
        default_ttl: Duration,
    ) -> CacheResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        let cache = Self::from_connection(conn, Some(path.to_path_buf()), max_size, default_ttl)?;
        info!(path = %path.display(), max_size, "Opened sqlite cache");
        Ok(cache)
    }

    /// Non-persistent database, mostly for tests.
    pub fn open_in_memory(max_size: usize, default_ttl: Duration) -> CacheResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, None, max_size, default_ttl)
    }

    fn from_connection(
        conn: Connection,
        path: Option<PathBuf>,
        max_size: usize,
        default_ttl: Duration,
    ) -> CacheResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
            max_size: max_size.max(1),
            default_ttl,
            sweep_interval: DEFAULT_SQLITE_SWEEP_INTERVAL,
        })
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> CacheResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Returns the stored entry without recording an access.
    pub fn peek(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let conn = self.conn.lock();
        let entry = conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM cache WHERE key = ?1"),
                params![key],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }
}

fn next_seq(conn: &Connection) -> rusqlite::Result<i64> {
    conn.execute("UPDATE cache_seq SET value = value + 1 WHERE id = 0", [])?;
    conn.query_row("SELECT value FROM cache_seq WHERE id = 0", [], |row| {
        row.get(0)
    })
}

impl CacheBackend for SqliteCache {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn get_entry(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let now = unix_now();
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let entry = tx
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM cache WHERE key = ?1"),
                params![key],
                entry_from_row,
            )
            .optional()?;

        let Some(mut entry) = entry else {
            return Ok(None);
        };

        if entry.is_expired_at(now) {
            tx.execute("DELETE FROM cache WHERE key = ?1", params![key])?;
            tx.commit()?;
            debug!(key, "Expired entry dropped on read");
            return Ok(None);
        }

        let seq = next_seq(&tx)?;
        tx.execute(
            "UPDATE cache
             SET access_count = access_count + 1, last_accessed = ?2, access_seq = ?3
             WHERE key = ?1",
            params![key, now, seq],
        )?;
        tx.commit()?;
        entry.touch_at(now);
        Ok(Some(entry))
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        let ttl = resolve_ttl(ttl, self.default_ttl)?;
        let now = unix_now();
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM cache WHERE key = ?1)",
            params![key],
            |row| row.get(0),
        )?;

        if !exists {
            let count: i64 = tx.query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))?;
            if count as usize >= self.max_size {
                let evicted: Option<String> = tx
                    .query_row(
                        "SELECT key FROM cache ORDER BY last_accessed ASC, access_seq ASC LIMIT 1",
                        [],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(evicted) = evicted {
                    tx.execute("DELETE FROM cache WHERE key = ?1", params![evicted])?;
                    debug!(evicted = %evicted, max_size = self.max_size, "Evicted LRU entry");
                }
            }
        }

        let seq = next_seq(&tx)?;
        tx.execute(
            "INSERT OR REPLACE INTO cache
                (key, value, created_at, ttl_seconds, access_count, last_accessed, access_seq)
             VALUES (?1, ?2, ?3, ?4, 0, ?3, ?5)",
            params![key, value, now, ttl.as_secs_f64(), seq],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete(&self, key: &str) -> CacheResult<bool> {
        let conn = self.conn.lock();
        let removed = conn.execute("DELETE FROM cache WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    fn clear(&self) -> CacheResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM cache", [])?;
        Ok(())
    }

    fn stats(&self) -> CacheResult<BackendStats> {
        let now = unix_now();
        let conn = self.conn.lock();
        let (entries, expired, accesses): (i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN ?1 - created_at > ttl_seconds THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(access_count), 0)
             FROM cache",
            params![now],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let mut stats = BackendStats::new(BackendKind::Sqlite, self.max_size);
        stats.entries = entries as usize;
        stats.expired_entries = expired as usize;
        stats.total_accesses = accesses as u64;
        Ok(stats)
    }

    fn sweep_expired(&self) -> CacheResult<usize> {
        let now = unix_now();
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM cache WHERE ?1 - created_at > ttl_seconds",
            params![now],
        )?;
        if removed > 0 {
            debug!(removed, "Swept expired sqlite cache entries");
        }
        Ok(removed)
    }

    fn sweep_interval(&self) -> Option<Duration> {
        Some(self.sweep_interval)
    }
}
