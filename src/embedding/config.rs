use std::path::PathBuf;

use super::backend::BERT_MAX_SEQ_LEN;
use super::error::EmbeddingError;
use super::text::DEFAULT_MAX_TEXT_CHARS;
use crate::constants::DEFAULT_EMBEDDING_DIM;

/// Texts per backend call.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// New cache entries between automatic cache-file writes.
pub const DEFAULT_FLUSH_EVERY: usize = 100;

/// In-memory embedding cache capacity.
pub const DEFAULT_CACHE_CAPACITY: u64 = 100_000;

#[derive(Debug, Clone)]
/// Configuration for [`EmbeddingProvider`](super::EmbeddingProvider).
pub struct EmbeddingConfig {
    /// Sentence-encoder directory. `None` selects the hashing embedder.
    pub model_path: Option<PathBuf>,
    /// Output dimension. A loaded model must match it.
    pub dimension: usize,
    pub batch_size: usize,
    pub max_seq_len: usize,
    /// Inputs are cut to this many characters before encoding.
    pub max_text_chars: usize,
    pub cache_capacity: u64,
    /// Persistent cache file. `None` keeps the cache in memory only.
    pub cache_path: Option<PathBuf>,
    pub flush_every: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            dimension: DEFAULT_EMBEDDING_DIM,
            batch_size: DEFAULT_BATCH_SIZE,
            max_seq_len: BERT_MAX_SEQ_LEN,
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_path: None,
            flush_every: DEFAULT_FLUSH_EVERY,
        }
    }
}

impl EmbeddingConfig {
    pub fn new<P: Into<PathBuf>>(model_path: P) -> Self {
        Self {
            model_path: Some(model_path.into()),
            ..Default::default()
        }
    }

    /// Hashing embedder with the given dimension, no cache file.
    pub fn stub(dimension: usize) -> Self {
        Self {
            dimension,
            ..Default::default()
        }
    }

    pub fn with_cache_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_flush_every(mut self, flush_every: usize) -> Self {
        self.flush_every = flush_every;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: u64) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<(), EmbeddingError> {
        let zero = [
            ("dimension", self.dimension),
            ("batch_size", self.batch_size),
            ("max_seq_len", self.max_seq_len),
            ("max_text_chars", self.max_text_chars),
            ("flush_every", self.flush_every),
        ]
        .into_iter()
        .find(|(_, v)| *v == 0);

        if let Some((name, _)) = zero {
            return Err(EmbeddingError::InvalidConfig {
                reason: format!("{name} must be > 0"),
            });
        }

        if let Some(ref path) = self.model_path
            && path.as_os_str().is_empty()
        {
            return Err(EmbeddingError::InvalidConfig {
                reason: "model_path cannot be empty when provided".to_string(),
            });
        }

        Ok(())
    }
}
