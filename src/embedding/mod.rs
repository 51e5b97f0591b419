//! Embedding + model utilities.
//!
//! - [`provider`] turns text into cached, unit-norm vectors.
//! - [`reranker`] scores (query, passage) pairs for stage-2 ranking.

/// Embedding backends (BERT sentence encoder, hashing).
pub mod backend;
/// BERT encoder and classifier wrappers.
pub mod bert;
pub mod config;
/// Device selection (CPU / Metal / CUDA).
pub mod device;
mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod provider;
/// Cross-encoder reranker.
pub mod reranker;
pub mod text;
/// Tokenizer/model loading helpers.
pub mod utils;

#[cfg(test)]
mod tests;

pub use backend::{BERT_MAX_SEQ_LEN, BertEmbedder, EmbeddingBackend, HashingEmbedder, l2_normalize};
pub use config::{DEFAULT_BATCH_SIZE, DEFAULT_CACHE_CAPACITY, DEFAULT_FLUSH_EVERY, EmbeddingConfig};
pub use error::{EmbeddingError, EmbeddingResult};
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockCrossEncoder, MockEmbeddingBackend};
pub use provider::{EmbeddingModelInfo, EmbeddingProvider, cosine_similarity};
pub use reranker::{
    CrossEncoder, LexicalCrossEncoder, Reranker, RerankerConfig, RerankerError,
    RerankerModelInfo, ScoreFusion,
};
