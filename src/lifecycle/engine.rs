//! Owned engine state: components built once, shared as `Arc`s, stopped explicitly.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::{self, JoinHandle};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use super::config::LifecycleConfig;
use super::error::{LifecycleError, LifecycleResult};
use super::sweeper::Sweeper;
use super::types::ShutdownReport;
use crate::cache::{CacheConfig, CacheManager, build_backend};
use crate::config::Config;
use crate::embedding::{EmbeddingConfig, EmbeddingProvider, Reranker, RerankerConfig};
use crate::evidence::{EvidenceRecord, QueryResult};
use crate::index::{IndexConfig, VectorIndex};
use crate::retrieval::{
    CancelFlag, EvidenceRetriever, HybridRetriever, IngestReport, PerformanceStats,
};

/// Assembles an [`Engine`] from a [`Config`], with optional pre-built components.
pub struct EngineBuilder {
    config: Config,
    lifecycle: LifecycleConfig,
    provider: Option<Arc<EmbeddingProvider>>,
    reranker: Option<Arc<Reranker>>,
    reranker_config: Option<RerankerConfig>,
    index_config: Option<IndexConfig>,
    cache_config: Option<CacheConfig>,
    result_cache: bool,
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .field("lifecycle", &self.lifecycle)
            .field("result_cache", &self.result_cache)
            .finish_non_exhaustive()
    }
}

impl EngineBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            lifecycle: LifecycleConfig::default(),
            provider: None,
            reranker: None,
            reranker_config: None,
            index_config: None,
            cache_config: None,
            result_cache: true,
        }
    }

    pub fn with_lifecycle(mut self, lifecycle: LifecycleConfig) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Uses `provider` instead of loading one from the config.
    pub fn with_provider(mut self, provider: Arc<EmbeddingProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Uses `reranker` instead of loading one from the config.
    pub fn with_reranker(mut self, reranker: Arc<Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Reranker settings (fusion weights, passage budget). The model path still comes
    /// from [`Config::reranker_path`] when this config has none.
    pub fn with_reranker_config(mut self, reranker_config: RerankerConfig) -> Self {
        self.reranker_config = Some(reranker_config);
        self
    }

    pub fn with_index_config(mut self, index_config: IndexConfig) -> Self {
        self.index_config = Some(index_config);
        self
    }

    pub fn with_cache_config(mut self, cache_config: CacheConfig) -> Self {
        self.cache_config = Some(cache_config);
        self
    }

    /// Skips the query-result cache entirely.
    pub fn without_result_cache(mut self) -> Self {
        self.result_cache = false;
        self
    }

    fn embedding_config(&self) -> EmbeddingConfig {
        EmbeddingConfig {
            model_path: self.config.embedding_model_path.clone(),
            dimension: self.config.embedding_dim,
            ..Default::default()
        }
        .with_cache_path(self.config.embedding_cache_path())
    }

    /// Builds every component and reloads a saved index from the data directory.
    ///
    /// A model that fails to load leaves its stage unavailable instead of failing the build.
    /// Configuration, index and cache errors are returned. No background task runs until
    /// [`Engine::start`].
    #[instrument(skip_all, fields(data_dir = %self.config.data_dir.display()))]
    pub fn build(self) -> LifecycleResult<Engine> {
        self.config.validate()?;
        self.lifecycle.validate()?;

        let provider = match self.provider.clone() {
            Some(provider) => provider,
            None => Arc::new(EmbeddingProvider::load_or_degrade(self.embedding_config())),
        };

        let reranker = match self.reranker {
            Some(reranker) => reranker,
            None => {
                let mut reranker_config = self.reranker_config.unwrap_or_default();
                if reranker_config.model_path.is_none() {
                    reranker_config.model_path = self.config.reranker_path.clone();
                }
                Arc::new(Reranker::load_or_degrade(reranker_config))
            }
        };

        let index_config = self
            .index_config
            .unwrap_or_else(|| IndexConfig::new(self.config.embedding_dim));
        if index_config.dimension != provider.dimension() {
            return Err(LifecycleError::Config(format!(
                "index dimension {} does not match embedding dimension {}",
                index_config.dimension,
                provider.dimension()
            )));
        }
        let index = Arc::new(VectorIndex::open(index_config, &self.config.index_dir())?);

        let mut hybrid = HybridRetriever::from_parts(Arc::clone(&provider), index, reranker);
        let cache = if self.result_cache {
            let cache_config = self
                .cache_config
                .unwrap_or_else(|| self.config.cache_config());
            let manager = Arc::new(CacheManager::new(build_backend(&cache_config)?));
            hybrid = hybrid.with_result_cache(Arc::clone(&manager), None);
            Some(manager)
        } else {
            None
        };

        let engine = Engine {
            config: self.config,
            lifecycle: self.lifecycle,
            hybrid: Arc::new(hybrid),
            cache,
            sweeper: Mutex::new(None),
            flush_task: Mutex::new(None),
            stop: Arc::new(AtomicBool::new(false)),
            shut_down: AtomicBool::new(false),
        };
        info!(
            evidence = engine.index().len(),
            embedding = ?engine.provider().backend_name(),
            reranker = ?engine.hybrid.reranker().backend_name(),
            "Engine built"
        );
        Ok(engine)
    }
}

/// The retrieval engine: ingestion, hybrid queries, persistence and background upkeep.
pub struct Engine {
    config: Config,
    lifecycle: LifecycleConfig,
    hybrid: Arc<HybridRetriever>,
    cache: Option<Arc<CacheManager>>,
    sweeper: Mutex<Option<Sweeper>>,
    flush_task: Mutex<Option<JoinHandle<()>>>,
    stop: Arc<AtomicBool>,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("hybrid", &self.hybrid)
            .field("cache", &self.cache)
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn builder(config: Config) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn lifecycle_config(&self) -> &LifecycleConfig {
        &self.lifecycle
    }

    pub fn hybrid(&self) -> &Arc<HybridRetriever> {
        &self.hybrid
    }

    pub fn retriever(&self) -> &Arc<EvidenceRetriever> {
        self.hybrid.retriever()
    }

    pub fn provider(&self) -> &Arc<EmbeddingProvider> {
        self.retriever().provider()
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        self.retriever().index()
    }

    /// Query-result cache, if one was built.
    pub fn cache(&self) -> Option<&Arc<CacheManager>> {
        self.cache.as_ref()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn ensure_running(&self) -> LifecycleResult<()> {
        if self.is_shut_down() {
            return Err(LifecycleError::ShutDown);
        }
        Ok(())
    }

    /// Starts the cache sweeper and the embedding-cache flush task. Idempotent.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn start(&self) -> LifecycleResult<()> {
        self.ensure_running()?;
        tokio::runtime::Handle::try_current().map_err(|_| LifecycleError::NoRuntime)?;

        if self.lifecycle.enable_sweeper
            && let Some(cache) = &self.cache
        {
            let mut sweeper = self.sweeper.lock();
            if sweeper.is_none() {
                *sweeper = Some(Sweeper::start(cache.backend()));
            }
        }

        if self.provider().config().cache_path.is_some() {
            let mut flush_task = self.flush_task.lock();
            if flush_task.is_none() {
                *flush_task = Some(spawn_flush_task(
                    Arc::clone(self.provider()),
                    self.lifecycle.flush_interval,
                    Arc::clone(&self.stop),
                ));
            }
        }
        Ok(())
    }

    /// Number of running background tasks.
    pub fn background_tasks(&self) -> usize {
        let sweeps = self
            .sweeper
            .lock()
            .as_ref()
            .map_or(0, Sweeper::task_count);
        sweeps + usize::from(self.flush_task.lock().is_some())
    }

    /// Embeds and indexes `records`; returns `true` if any were added.
    ///
    /// Cached query results from before the add are no longer served.
    pub fn add_evidence(&self, records: &[EvidenceRecord]) -> LifecycleResult<bool> {
        self.ensure_running()?;
        Ok(self.retriever().add_evidence(records))
    }

    /// Bulk ingestion in chunks of [`LifecycleConfig::ingest_chunk_size`].
    pub fn ingest(
        &self,
        records: &[EvidenceRecord],
        cancel: &CancelFlag,
    ) -> LifecycleResult<IngestReport> {
        self.ensure_running()?;
        Ok(self
            .retriever()
            .add_evidence_chunked(records, self.lifecycle.ingest_chunk_size, cancel))
    }

    pub fn retrieve_and_rerank(
        &self,
        query: &str,
        initial_top_k: usize,
        final_top_k: usize,
        min_similarity: f32,
    ) -> LifecycleResult<QueryResult> {
        self.ensure_running()?;
        Ok(self
            .hybrid
            .retrieve_and_rerank(query, initial_top_k, final_top_k, min_similarity))
    }

    /// [`Engine::retrieve_and_rerank`] with the configured `initial_top_k` and
    /// `final_top_k` and no similarity floor.
    pub fn query(&self, query: &str) -> LifecycleResult<QueryResult> {
        self.retrieve_and_rerank(
            query,
            self.config.initial_top_k,
            self.config.final_top_k,
            0.0,
        )
    }

    pub fn get_evidence_by_id(&self, id: &str) -> Option<EvidenceRecord> {
        self.retriever().get_evidence_by_id(id)
    }

    pub fn get_performance_stats(&self) -> PerformanceStats {
        self.hybrid.get_performance_stats()
    }

    /// Saves the index under the data directory and flushes the embedding cache file.
    pub fn persist(&self) -> LifecycleResult<()> {
        self.retriever().save_corpus(&self.config.index_dir())?;
        Ok(())
    }

    /// Stops background tasks, flushes the embedding cache and (if configured) saves the
    /// index. Later calls do nothing and return an empty report.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> LifecycleResult<ShutdownReport> {
        // AcqRel: only the first caller runs the shutdown sequence.
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(ShutdownReport::default());
        }
        self.stop.store(true, Ordering::Release);

        let mut report = ShutdownReport::default();

        let sweeper = self.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            report.stopped_tasks += sweeper.shutdown().await;
        }
        let flush_task = self.flush_task.lock().take();
        if let Some(handle) = flush_task {
            handle.abort();
            let _ = handle.await;
            report.stopped_tasks += 1;
        }

        match self.provider().flush() {
            Ok(flushed) => report.flushed_embeddings = flushed,
            Err(e) => warn!(error = %e, "Final embedding cache flush failed"),
        }

        if self.lifecycle.persist_on_shutdown && !self.index().is_empty() {
            self.index().persist(&self.config.index_dir())?;
            report.persisted = true;
        }

        info!(
            stopped_tasks = report.stopped_tasks,
            flushed_embeddings = report.flushed_embeddings,
            persisted = report.persisted,
            "Engine shut down"
        );
        Ok(report)
    }
}

fn spawn_flush_task(
    provider: Arc<EmbeddingProvider>,
    period: Duration,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if stop.load(Ordering::Acquire) {
                break;
            }
            if provider.unflushed_entries() == 0 {
                continue;
            }

            let target = Arc::clone(&provider);
            match task::spawn_blocking(move || target.flush()).await {
                Ok(Ok(0)) => {}
                Ok(Ok(entries)) => debug!(entries, "Periodic embedding cache flush"),
                Ok(Err(e)) => warn!(error = %e, "Periodic embedding cache flush failed"),
                Err(e) => warn!(error = %e, "Embedding flush task panicked"),
            }
        }
    })
}
