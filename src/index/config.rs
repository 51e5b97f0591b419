use serde::{Deserialize, Serialize};

use super::error::IndexError;
use super::hnsw::HnswConfig;
use crate::constants::DEFAULT_EMBEDDING_DIM;

/// Indexes at or below this many vectors are searched exhaustively.
pub const DEFAULT_EXACT_SEARCH_THRESHOLD: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub dimension: usize,
    pub hnsw: HnswConfig,
    pub exact_search_threshold: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_EMBEDDING_DIM,
            hnsw: HnswConfig::default(),
            exact_search_threshold: DEFAULT_EXACT_SEARCH_THRESHOLD,
        }
    }
}

impl IndexConfig {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Default::default()
        }
    }

    pub fn with_hnsw(mut self, hnsw: HnswConfig) -> Self {
        self.hnsw = hnsw;
        self
    }

    /// `0` always uses the graph.
    pub fn with_exact_search_threshold(mut self, threshold: usize) -> Self {
        self.exact_search_threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<(), IndexError> {
        if self.dimension == 0 {
            return Err(IndexError::InvalidConfig {
                reason: "dimension must be > 0".to_string(),
            });
        }
        self.hnsw
            .validate()
            .map_err(|reason| IndexError::InvalidConfig { reason })
    }
}
