//! Periodic expiry sweeps for cache backends.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::{self, JoinHandle};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::CacheBackend;

/// Leaf backends under `backend`, in tier order.
pub(crate) fn leaves(backend: &Arc<dyn CacheBackend>) -> Vec<Arc<dyn CacheBackend>> {
    let tiers = backend.tiers();
    if tiers.is_empty() {
        return vec![Arc::clone(backend)];
    }
    tiers.iter().flat_map(leaves).collect()
}

/// One tokio task per leaf backend, each ticking on that backend's own interval.
///
/// Backends that expire keys themselves (no sweep interval) get no task.
pub struct Sweeper {
    stop: Arc<AtomicBool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Sweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sweeper")
            .field("tasks", &self.task_count())
            .field("stopped", &self.stop.load(Ordering::Acquire))
            .finish()
    }
}

impl Sweeper {
    /// Spawns the sweep tasks. Must be called from inside a tokio runtime.
    pub fn start(backend: &Arc<dyn CacheBackend>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let handles = leaves(backend)
            .into_iter()
            .filter_map(|leaf| {
                let interval = leaf.sweep_interval()?;
                Some(spawn_sweep(leaf, interval, Arc::clone(&stop)))
            })
            .collect::<Vec<_>>();

        info!(tasks = handles.len(), "Cache sweeper started");
        Self {
            stop,
            handles: Mutex::new(handles),
        }
    }

    pub fn task_count(&self) -> usize {
        self.handles.lock().len()
    }

    /// Signals every task, aborts it and waits for it to finish. Returns how many were
    /// stopped; later calls return `0`.
    pub async fn shutdown(&self) -> usize {
        // Release: tasks that observe the flag with Acquire see everything before it.
        self.stop.store(true, Ordering::Release);
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        let count = handles.len();
        for handle in handles {
            handle.abort();
            let _ = handle.await;
        }
        if count > 0 {
            debug!(tasks = count, "Cache sweeper stopped");
        }
        count
    }
}

fn spawn_sweep(
    backend: Arc<dyn CacheBackend>,
    period: Duration,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if stop.load(Ordering::Acquire) {
                break;
            }

            let target = Arc::clone(&backend);
            match task::spawn_blocking(move || target.sweep_expired()).await {
                Ok(Ok(0)) => {}
                Ok(Ok(removed)) => {
                    debug!(backend = %backend.kind(), removed, "Expired cache entries swept");
                }
                Ok(Err(e)) => {
                    warn!(backend = %backend.kind(), error = %e, "Cache sweep failed");
                }
                Err(e) => {
                    warn!(backend = %backend.kind(), error = %e, "Cache sweep task panicked");
                }
            }
        }
    })
}
