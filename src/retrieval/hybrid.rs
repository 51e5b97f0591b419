//! Two-stage retrieval: dense recall, then cross-encoder reranking.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::retriever::EvidenceRetriever;
use crate::cache::{CacheManager, CacheReport};
use crate::constants::{DEFAULT_FINAL_TOP_K, DEFAULT_INITIAL_TOP_K};
use crate::embedding::{EmbeddingModelInfo, EmbeddingProvider, Reranker, RerankerModelInfo};
use crate::evidence::{EvidenceRecord, QueryResult, RankingMethod};
use crate::hashing::hash_query;
use crate::index::VectorIndex;

const RESULT_KEY_PREFIX: &str = "query:";

/// Snapshot of a [`HybridRetriever`] for stats endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceStats {
    pub index_size: usize,
    pub dimension: usize,
    pub scorer_loaded: bool,
    pub scorer_backend: Option<String>,
    /// Method a query would currently be ranked with.
    pub ranking_method: RankingMethod,
    pub embedding: EmbeddingModelInfo,
    pub reranker: RerankerModelInfo,
    /// Present when a result cache is attached.
    pub result_cache: Option<CacheReport>,
}

struct ResultCache {
    manager: Arc<CacheManager>,
    ttl: Option<Duration>,
}

/// Dense recall of `initial_top_k` candidates followed by reranking down to `final_top_k`.
///
/// Stage 2 never fails a query: if the scorer is missing or errors, the stage-1 order is
/// returned, truncated and tagged [`RankingMethod::DenseOnly`].
pub struct HybridRetriever {
    retriever: Arc<EvidenceRetriever>,
    reranker: Arc<Reranker>,
    results: Option<ResultCache>,
}

impl std::fmt::Debug for HybridRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridRetriever")
            .field("retriever", &self.retriever)
            .field("reranker", &self.reranker)
            .field("result_cache", &self.results.is_some())
            .finish()
    }
}

impl HybridRetriever {
    pub fn new(retriever: Arc<EvidenceRetriever>, reranker: Arc<Reranker>) -> Self {
        Self {
            retriever,
            reranker,
            results: None,
        }
    }

    /// Builds the stage-1 retriever from its parts.
    pub fn from_parts(
        provider: Arc<EmbeddingProvider>,
        index: Arc<VectorIndex>,
        reranker: Arc<Reranker>,
    ) -> Self {
        Self::new(Arc::new(EvidenceRetriever::new(provider, index)), reranker)
    }

    /// Caches full query results in `manager`. `ttl = None` uses the backend default.
    pub fn with_result_cache(mut self, manager: Arc<CacheManager>, ttl: Option<Duration>) -> Self {
        self.results = Some(ResultCache { manager, ttl });
        self
    }

    pub fn retriever(&self) -> &Arc<EvidenceRetriever> {
        &self.retriever
    }

    pub fn reranker(&self) -> &Arc<Reranker> {
        &self.reranker
    }

    /// Drops every cached query result.
    ///
    /// Not needed after adds: results are keyed by index generation, so older entries are
    /// never served and age out of the cache on their own.
    pub fn invalidate_results(&self) {
        if let Some(cache) = &self.results
            && cache.manager.clear()
        {
            debug!("Query result cache cleared");
        }
    }

    /// [`HybridRetriever::retrieve_and_rerank`] with the default `50 -> 10` funnel and no
    /// similarity floor.
    pub fn retrieve(&self, query: &str) -> QueryResult {
        self.retrieve_and_rerank(query, DEFAULT_INITIAL_TOP_K, DEFAULT_FINAL_TOP_K, 0.0)
    }

    /// Recalls `initial_top_k` candidates, reranks them and keeps the best `final_top_k`.
    ///
    /// Output records carry a 1-based `final_rank`. Reranked output is sorted by
    /// `combined_score`; degraded output keeps stage-1 similarity order. A result is only
    /// cached if the index did not change while it was being computed.
    #[instrument(skip(self, query), fields(query_len = query.len()))]
    pub fn retrieve_and_rerank(
        &self,
        query: &str,
        initial_top_k: usize,
        final_top_k: usize,
        min_similarity: f32,
    ) -> QueryResult {
        let index = self.retriever.index();
        let generation = index.generation();
        let key = self
            .results
            .as_ref()
            .map(|_| cache_key(generation, query, initial_top_k, final_top_k, min_similarity));
        if let (Some(cache), Some(key)) = (&self.results, &key)
            && let Some(hit) = cache.manager.get_json::<QueryResult>(key)
        {
            debug!(results = hit.len(), "Query result cache hit");
            return hit;
        }

        let candidates = self
            .retriever
            .retrieve_evidence(query, initial_top_k, min_similarity);
        if candidates.is_empty() {
            debug!("No candidates from dense retrieval");
            return QueryResult::new(Vec::new(), self.current_method());
        }

        let result = self.rank(query, candidates, final_top_k);
        info!(
            results = result.len(),
            method = %result.ranking_method,
            "Hybrid retrieval complete"
        );

        if let (Some(cache), Some(key)) = (&self.results, &key)
            && self.should_cache(&result)
        {
            if index.generation() != generation {
                debug!("Index changed during retrieval, result not cached");
            } else if let Err(e) = cache.manager.set_json(key, &result, cache.ttl) {
                warn!(error = %e, "Failed to cache query result");
            }
        }
        result
    }

    fn rank(
        &self,
        query: &str,
        candidates: Vec<EvidenceRecord>,
        final_top_k: usize,
    ) -> QueryResult {
        let (mut records, method) =
            match self.reranker.try_rerank(query, &candidates, Some(final_top_k)) {
                Ok(reranked) => (reranked, RankingMethod::Hybrid),
                Err(e) => {
                    if self.reranker.is_model_loaded() {
                        warn!(error = %e, "Reranking failed, using dense ranking");
                    } else {
                        debug!("Cross-encoder not available, using dense ranking");
                    }
                    let mut dense = candidates;
                    dense.truncate(final_top_k);
                    (dense, RankingMethod::DenseOnly)
                }
            };

        for (i, record) in records.iter_mut().enumerate() {
            record.scores.final_rank = Some(i + 1);
        }
        QueryResult::new(records, method)
    }

    /// Empty results are never cached; dense-only ones only when no scorer is loaded.
    fn should_cache(&self, result: &QueryResult) -> bool {
        if result.is_empty() {
            return false;
        }
        result.ranking_method == RankingMethod::Hybrid || !self.reranker.is_model_loaded()
    }

    fn current_method(&self) -> RankingMethod {
        if self.reranker.is_model_loaded() {
            RankingMethod::Hybrid
        } else {
            RankingMethod::DenseOnly
        }
    }

    pub fn get_performance_stats(&self) -> PerformanceStats {
        let index = self.retriever.index();
        PerformanceStats {
            index_size: index.len(),
            dimension: index.dimension(),
            scorer_loaded: self.reranker.is_model_loaded(),
            scorer_backend: self.reranker.backend_name().map(str::to_string),
            ranking_method: self.current_method(),
            embedding: self.retriever.provider().model_info(),
            reranker: self.reranker.model_info(),
            result_cache: self.results.as_ref().map(|c| c.manager.report()),
        }
    }
}

fn cache_key(
    generation: u64,
    query: &str,
    initial_top_k: usize,
    final_top_k: usize,
    min_similarity: f32,
) -> String {
    format!(
        "{RESULT_KEY_PREFIX}{generation}:{}",
        hash_query(query, initial_top_k, final_top_k, min_similarity)
    )
}
