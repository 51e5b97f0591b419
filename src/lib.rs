//! factlens library crate (used by the CLI binary and integration tests).
//!
//! # Public API Surface
//!
//! ## Retrieval
//! - [`Engine`], [`EngineBuilder`] - Owned engine with background upkeep
//! - [`HybridRetriever`] - Dense recall followed by cross-encoder reranking
//! - [`EvidenceRetriever`] - Embedding, indexing and dense search
//! - [`EvidenceRecord`], [`QueryResult`], [`RankingMethod`] - Data model
//!
//! ## Models
//! - [`EmbeddingProvider`], [`EmbeddingConfig`] - Cached sentence embeddings
//! - [`Reranker`], [`RerankerConfig`] - Cross-encoder scoring and score fusion
//!
//! ## Index
//! - [`VectorIndex`], [`IndexConfig`] - HNSW index with persistence
//!
//! ## Caching
//! - [`CacheManager`], [`CacheBackend`] - Memory, SQLite, Redis and tiered backends
//!
//! ## Test/Mock Support
//! Mock implementations are available behind `#[cfg(any(test, feature = "mock"))]`.

pub mod cache;
pub mod config;
pub mod constants;
pub mod embedding;
pub mod evidence;
pub mod hashing;
pub mod index;
pub mod lifecycle;
pub mod retrieval;
pub mod snapshot;

pub use cache::{
    CacheBackend, CacheBackendKind, CacheConfig, CacheError, CacheManager, CacheMetrics,
    CacheReport, MemoryCache, RedisCache, SqliteCache, TieredCache, build_backend,
};
pub use config::{Config, ConfigError};
pub use constants::{
    DEFAULT_CACHE_MAX_SIZE, DEFAULT_CACHE_TTL_SECS, DEFAULT_CREDIBILITY_SCORE,
    DEFAULT_EMBEDDING_DIM, DEFAULT_FINAL_TOP_K, DEFAULT_INITIAL_TOP_K,
};
#[cfg(any(test, feature = "mock"))]
pub use embedding::{MockCrossEncoder, MockEmbeddingBackend};
pub use embedding::{
    CrossEncoder, EmbeddingBackend, EmbeddingConfig, EmbeddingError, EmbeddingProvider,
    Reranker, RerankerConfig, RerankerError,
};
pub use evidence::{EvidenceRecord, QueryResult, QueryScores, RankingMethod};
pub use hashing::{hash_query, hash_text, hash_to_u64, normalize_text};
pub use index::{IndexConfig, IndexError, SearchHit, VectorIndex};
pub use lifecycle::{
    Engine, EngineBuilder, LifecycleConfig, LifecycleError, LifecycleResult, ShutdownReport,
};
pub use retrieval::{CancelFlag, EvidenceRetriever, HybridRetriever, PerformanceStats};
