//! Cross-cutting, shared constants.
//!
//! The embedding dimension is fixed for the lifetime of an index: the provider, the index and
//! any persisted snapshot must agree on it. The engine checks this once at build time and the
//! index checks it again on every add, search and reload.

/// Default embedding dimension (MiniLM-class sentence encoders).
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

/// Default number of stage-1 (dense recall) candidates.
pub const DEFAULT_INITIAL_TOP_K: usize = 50;

/// Default number of results returned after stage-2 reranking.
pub const DEFAULT_FINAL_TOP_K: usize = 10;

/// Default credibility assigned to evidence without an explicit score.
pub const DEFAULT_CREDIBILITY_SCORE: f32 = 0.5;

/// Default TTL applied by cache backends when a caller does not pass one.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Default max entries per cache backend.
pub const DEFAULT_CACHE_MAX_SIZE: usize = 10_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_funnel_narrows() {
        assert!(DEFAULT_INITIAL_TOP_K >= DEFAULT_FINAL_TOP_K);
        assert!(DEFAULT_FINAL_TOP_K > 0);
    }
}
