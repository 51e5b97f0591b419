use std::env;
use std::time::Duration;

use super::error::{LifecycleError, LifecycleResult};

/// Default period of the embedding-cache flush task.
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 60;

/// Default stage-1 chunk size for bulk ingestion.
pub const DEFAULT_INGEST_CHUNK_SIZE: usize = 256;

#[derive(Debug, Clone, PartialEq)]
/// Background-task and shutdown behaviour of an [`Engine`](super::Engine).
pub struct LifecycleConfig {
    /// How often the embedding cache file is rewritten.
    pub flush_interval: Duration,
    /// Run one sweep task per cache backend.
    pub enable_sweeper: bool,
    /// Save the index on shutdown when it holds anything.
    pub persist_on_shutdown: bool,
    /// Records per atomic index write in [`Engine::ingest`](super::Engine::ingest).
    pub ingest_chunk_size: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(DEFAULT_FLUSH_INTERVAL_SECS),
            enable_sweeper: true,
            persist_on_shutdown: true,
            ingest_chunk_size: DEFAULT_INGEST_CHUNK_SIZE,
        }
    }
}

impl LifecycleConfig {
    const ENV_FLUSH_INTERVAL_SECS: &'static str = "FACTLENS_FLUSH_INTERVAL_SECS";
    const ENV_ENABLE_SWEEPER: &'static str = "FACTLENS_ENABLE_SWEEPER";
    const ENV_PERSIST_ON_SHUTDOWN: &'static str = "FACTLENS_PERSIST_ON_SHUTDOWN";
    const ENV_INGEST_CHUNK_SIZE: &'static str = "FACTLENS_INGEST_CHUNK_SIZE";

    /// Loads config from environment variables (with defaults).
    pub fn from_env() -> LifecycleResult<Self> {
        let defaults = Self::default();
        let flush_interval = env::var(Self::ENV_FLUSH_INTERVAL_SECS)
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.flush_interval);
        let enable_sweeper = Self::flag(Self::ENV_ENABLE_SWEEPER, defaults.enable_sweeper);
        let persist_on_shutdown =
            Self::flag(Self::ENV_PERSIST_ON_SHUTDOWN, defaults.persist_on_shutdown);
        let ingest_chunk_size = env::var(Self::ENV_INGEST_CHUNK_SIZE)
            .ok()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(defaults.ingest_chunk_size);

        let config = Self {
            flush_interval,
            enable_sweeper,
            persist_on_shutdown,
            ingest_chunk_size,
        };
        config.validate()?;
        Ok(config)
    }

    fn flag(name: &str, default: bool) -> bool {
        env::var(name)
            .map(|s| s != "false" && s != "0")
            .unwrap_or(default)
    }

    pub fn validate(&self) -> LifecycleResult<()> {
        if self.flush_interval.is_zero() {
            return Err(LifecycleError::Config(
                "flush_interval must be > 0".to_string(),
            ));
        }
        if self.ingest_chunk_size == 0 {
            return Err(LifecycleError::Config(
                "ingest_chunk_size must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Short intervals, no persistence on shutdown.
    #[cfg(any(test, feature = "mock"))]
    pub fn for_testing() -> Self {
        Self {
            flush_interval: Duration::from_millis(20),
            enable_sweeper: true,
            persist_on_shutdown: false,
            ingest_chunk_size: 2,
        }
    }
}
