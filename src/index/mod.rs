//! Mutable ANN index binding graph nodes to evidence metadata.
//!
//! A position `p` names graph node `p` and `metadata[p]`. Both grow together inside one
//! write-lock critical section, so readers never see one without the other. Every change to
//! the contents bumps [`VectorIndex::generation`].

pub mod config;
pub mod error;
pub mod hnsw;
mod persist;

#[cfg(test)]
mod tests;

pub use config::{DEFAULT_EXACT_SEARCH_THRESHOLD, IndexConfig};
pub use error::{IndexError, IndexResult};
pub use persist::{INDEX_FILE, METADATA_FILE};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::evidence::EvidenceRecord;
use hnsw::{HnswGraph, exact_search, knn_search, similarity_from_distance};

/// One search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub position: usize,
    /// `1 / (1 + squared_l2)`, in `(0, 1]`.
    pub similarity: f32,
    /// Stored form of the record at `position`.
    pub metadata: EvidenceRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub len: usize,
    pub dimension: usize,
    pub registered_ids: usize,
    pub max_layer: usize,
    /// Whether searches currently scan every vector.
    pub exhaustive: bool,
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

pub(crate) struct IndexState {
    pub(crate) graph: HnswGraph,
    pub(crate) metadata: Vec<EvidenceRecord>,
    pub(crate) id_to_position: HashMap<String, usize>,
    /// Graphs at or below this size are scanned exhaustively.
    pub(crate) exact_search_threshold: usize,
}

impl IndexState {
    fn empty(config: &IndexConfig) -> Self {
        Self {
            graph: HnswGraph::new(config.dimension, config.hnsw.clone()),
            metadata: Vec::new(),
            id_to_position: HashMap::new(),
            exact_search_threshold: config.exact_search_threshold,
        }
    }

    fn exhaustive(&self) -> bool {
        self.graph.len() <= self.exact_search_threshold
    }
}

pub struct VectorIndex {
    config: IndexConfig,
    state: RwLock<IndexState>,
    generation: AtomicU64,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("dimension", &self.config.dimension)
            .field("len", &self.len())
            .finish()
    }
}

impl VectorIndex {
    pub fn new(config: IndexConfig) -> IndexResult<Self> {
        config.validate()?;
        let state = IndexState::empty(&config);
        Ok(Self {
            config,
            state: RwLock::new(state),
            generation: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Counter bumped by every add, clear and reload.
    ///
    /// Two equal readings mean no write landed in between.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Must be called with the write lock held.
    pub(crate) fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Threshold in effect, which a reload may have taken from the saved copy.
    pub fn exact_search_threshold(&self) -> usize {
        self.state.read().exact_search_threshold
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    pub fn len(&self) -> usize {
        self.state.read().metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_dimension(&self, actual: usize) -> IndexResult<()> {
        if actual != self.config.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.config.dimension,
                actual,
            });
        }
        Ok(())
    }

    /// Appends vectors with their metadata, registering `ids` when given.
    ///
    /// All inputs are validated before anything is written. Empty ids are not registered;
    /// a repeated id points at its newest position. Returns `Ok(false)` for an empty batch.
    #[instrument(skip_all, fields(count = vectors.len()))]
    pub fn add(
        &self,
        vectors: &[Vec<f32>],
        metadata: &[EvidenceRecord],
        ids: Option<&[String]>,
    ) -> IndexResult<bool> {
        if metadata.len() != vectors.len() {
            return Err(IndexError::LengthMismatch {
                field: "metadata",
                expected: vectors.len(),
                actual: metadata.len(),
            });
        }
        if let Some(ids) = ids
            && ids.len() != vectors.len()
        {
            return Err(IndexError::LengthMismatch {
                field: "ids",
                expected: vectors.len(),
                actual: ids.len(),
            });
        }
        for v in vectors {
            self.check_dimension(v.len())?;
        }
        if vectors.is_empty() {
            return Ok(false);
        }

        let stored: Vec<EvidenceRecord> = metadata.iter().map(EvidenceRecord::stored).collect();

        let mut state = self.state.write();
        for (i, (vector, record)) in vectors.iter().zip(stored).enumerate() {
            let position = state.graph.insert(vector) as usize;
            debug_assert_eq!(position, state.metadata.len());
            state.metadata.push(record);
            if let Some(id) = ids.map(|ids| &ids[i])
                && !id.is_empty()
            {
                state.id_to_position.insert(id.clone(), position);
            }
        }
        self.bump_generation();

        debug!(added = vectors.len(), total = state.metadata.len(), "Vectors indexed");
        Ok(true)
    }

    /// Nearest neighbors of `query`, most similar first.
    ///
    /// Small indexes are scanned exhaustively; larger ones go through the graph.
    #[instrument(skip_all, fields(top_k = top_k))]
    pub fn search(&self, query: &[f32], top_k: usize) -> IndexResult<Vec<SearchHit>> {
        self.check_dimension(query.len())?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let state = self.state.read();
        if state.metadata.is_empty() {
            return Ok(Vec::new());
        }

        let raw = if state.exhaustive() {
            exact_search(&state.graph, query, top_k)
        } else {
            let ef = state.graph.config.ef_search.max(top_k);
            knn_search(&state.graph, query, top_k, ef)
        };

        Ok(raw
            .into_iter()
            .filter_map(|(distance, id)| {
                let position = id as usize;
                state.metadata.get(position).map(|record| SearchHit {
                    position,
                    similarity: similarity_from_distance(distance),
                    metadata: record.clone(),
                })
            })
            .collect())
    }

    pub fn get(&self, position: usize) -> Option<EvidenceRecord> {
        self.state.read().metadata.get(position).cloned()
    }

    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.state.read().id_to_position.get(id).copied()
    }

    pub fn get_by_id(&self, id: &str) -> Option<(usize, EvidenceRecord)> {
        let state = self.state.read();
        let position = *state.id_to_position.get(id)?;
        state
            .metadata
            .get(position)
            .map(|record| (position, record.clone()))
    }

    /// Stored vector at `position`.
    pub fn vector(&self, position: usize) -> Option<Vec<f32>> {
        let state = self.state.read();
        (position < state.graph.len()).then(|| state.graph.vector(position as u32).to_vec())
    }

    /// Drops every vector, record and id, keeping dimension and build parameters.
    pub fn clear(&self) {
        let mut state = self.state.write();
        *state = IndexState::empty(&self.config);
        self.bump_generation();
        debug!("Index cleared");
    }

    pub fn stats(&self) -> IndexStats {
        let state = self.state.read();
        let hnsw = &state.graph.config;
        IndexStats {
            len: state.metadata.len(),
            dimension: self.config.dimension,
            registered_ids: state.id_to_position.len(),
            max_layer: state.graph.max_layer,
            exhaustive: state.exhaustive(),
            m: hnsw.m,
            ef_construction: hnsw.ef_construction,
            ef_search: hnsw.ef_search,
        }
    }
}
