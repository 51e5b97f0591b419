use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::backend::{EmbeddingBackend, HashingEmbedder};
use super::error::{EmbeddingError, EmbeddingResult};
use super::reranker::{CrossEncoder, LexicalCrossEncoder, RerankerError};

/// Hashing embedder that counts calls and can be told to fail.
#[derive(Debug, Clone)]
pub struct MockEmbeddingBackend {
    inner: HashingEmbedder,
    calls: Arc<AtomicUsize>,
    texts_seen: Arc<AtomicUsize>,
    fail_marker: Option<String>,
    output_dimension: Option<usize>,
}

impl MockEmbeddingBackend {
    pub fn new(dimension: usize) -> Self {
        Self {
            inner: HashingEmbedder::new(dimension),
            calls: Arc::new(AtomicUsize::new(0)),
            texts_seen: Arc::new(AtomicUsize::new(0)),
            fail_marker: None,
            output_dimension: None,
        }
    }

    /// Any batch containing a text with `marker` fails as a whole.
    pub fn failing_on(mut self, marker: impl Into<String>) -> Self {
        self.fail_marker = Some(marker.into());
        self
    }

    /// Emits vectors of the wrong length while still reporting the configured dimension.
    pub fn emitting_dimension(mut self, dimension: usize) -> Self {
        self.output_dimension = Some(dimension);
        self
    }

    /// Number of `embed_batch` calls so far (shared across clones).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of texts encoded so far (shared across clones).
    pub fn texts_seen(&self) -> usize {
        self.texts_seen.load(Ordering::SeqCst)
    }
}

impl EmbeddingBackend for MockEmbeddingBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts_seen.fetch_add(texts.len(), Ordering::SeqCst);

        if let Some(marker) = &self.fail_marker
            && texts.iter().any(|t| t.contains(marker.as_str()))
        {
            return Err(EmbeddingError::InferenceFailed {
                reason: format!("mock failure on '{marker}'"),
            });
        }

        let mut vectors = self.inner.embed_batch(texts)?;
        if let Some(dim) = self.output_dimension {
            vectors.iter_mut().for_each(|v| v.resize(dim, 0.0));
        }
        Ok(vectors)
    }
}

/// Lexical cross-encoder that counts calls and can be switched to fail.
#[derive(Debug, Clone, Default)]
pub struct MockCrossEncoder {
    inner: LexicalCrossEncoder,
    calls: Arc<AtomicUsize>,
    failing: bool,
    drop_last: bool,
}

impl MockCrossEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call returns an inference error.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Returns one score fewer than requested.
    pub fn short_output() -> Self {
        Self {
            drop_last: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CrossEncoder for MockCrossEncoder {
    fn name(&self) -> &str {
        "mock"
    }

    fn score_pairs(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>, RerankerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(RerankerError::InferenceFailed {
                reason: "mock cross-encoder failure".to_string(),
            });
        }
        let mut scores = self.inner.score_pairs(query, passages)?;
        if self.drop_last {
            scores.pop();
        }
        Ok(scores)
    }
}
