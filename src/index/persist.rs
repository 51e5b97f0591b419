//! On-disk form of a [`VectorIndex`].
//!
//! A directory holds two files: `index.bin`, the checksummed `rkyv` graph, and
//! `metadata.json`, the side table of records and ids. The graph is written first so a
//! crash between the two leaves a side table whose `node_count` no longer matches, which
//! reload reports as corruption instead of serving misaligned metadata.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use rkyv::rancor::Error as RkyvError;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::config::IndexConfig;
use super::error::{IndexError, IndexResult};
use super::hnsw::{HnswConfig, HnswGraph};
use super::{IndexState, VectorIndex};
use crate::evidence::EvidenceRecord;
use crate::snapshot::{SnapshotError, read_snapshot, write_atomic, write_snapshot};

/// Graph blob inside an index directory.
pub const INDEX_FILE: &str = "index.bin";

/// Side table inside an index directory.
pub const METADATA_FILE: &str = "metadata.json";

const INDEX_MAGIC: &[u8; 4] = b"FLX1";

const SIDE_TABLE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SideTable {
    version: u32,
    dimension: usize,
    hnsw: HnswConfig,
    exact_search_threshold: usize,
    node_count: usize,
    metadata: Vec<EvidenceRecord>,
    id_to_position: BTreeMap<String, usize>,
}

fn corrupted(reason: impl Into<String>) -> IndexError {
    IndexError::Corrupted {
        reason: reason.into(),
    }
}

impl VectorIndex {
    /// Whether `dir` holds both index files.
    pub fn exists(dir: &Path) -> bool {
        dir.join(INDEX_FILE).is_file() && dir.join(METADATA_FILE).is_file()
    }

    /// Creates an index, reloading it from `dir` when a saved copy is there.
    pub fn open(config: IndexConfig, dir: &Path) -> IndexResult<Self> {
        let index = Self::new(config)?;
        if Self::exists(dir) {
            index.reload(dir)?;
        }
        Ok(index)
    }

    /// Writes the graph and side table into `dir`, creating it if needed.
    ///
    /// Holds the read lock for the whole write, so the two files describe the same state.
    #[instrument(skip_all, fields(dir = %dir.display()))]
    pub fn persist(&self, dir: &Path) -> IndexResult<()> {
        std::fs::create_dir_all(dir)?;
        let state = self.state.read();

        let blob = rkyv::to_bytes::<RkyvError>(&state.graph).map_err(|e| {
            SnapshotError::Codec {
                reason: e.to_string(),
            }
        })?;
        write_snapshot(&dir.join(INDEX_FILE), INDEX_MAGIC, &blob)?;

        let table = SideTable {
            version: SIDE_TABLE_VERSION,
            dimension: self.config.dimension,
            hnsw: state.graph.config.clone(),
            exact_search_threshold: state.exact_search_threshold,
            node_count: state.graph.len(),
            metadata: state.metadata.clone(),
            id_to_position: state
                .id_to_position
                .iter()
                .map(|(id, &pos)| (id.clone(), pos))
                .collect(),
        };
        let json = serde_json::to_vec_pretty(&table)?;
        write_atomic(&dir.join(METADATA_FILE), &json)?;

        info!(
            vectors = table.node_count,
            bytes = blob.len(),
            "Index persisted"
        );
        Ok(())
    }

    /// Replaces the in-memory state with the copy saved in `dir`.
    ///
    /// Everything is decoded and checked before the swap; on error the current state is
    /// left untouched. Build parameters and the exact-search threshold stored with the graph
    /// win over the configured ones.
    #[instrument(skip_all, fields(dir = %dir.display()))]
    pub fn reload(&self, dir: &Path) -> IndexResult<usize> {
        let json = std::fs::read(dir.join(METADATA_FILE))?;
        let table: SideTable = serde_json::from_slice(&json)?;
        if table.version != SIDE_TABLE_VERSION {
            return Err(corrupted(format!(
                "unsupported side table version {}",
                table.version
            )));
        }
        if table.dimension != self.config.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.config.dimension,
                actual: table.dimension,
            });
        }

        let bytes = read_snapshot(&dir.join(INDEX_FILE), INDEX_MAGIC)?;
        let graph = rkyv::from_bytes::<HnswGraph, RkyvError>(&bytes).map_err(|e| {
            SnapshotError::Codec {
                reason: e.to_string(),
            }
        })?;

        if graph.dimension != self.config.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.config.dimension,
                actual: graph.dimension,
            });
        }
        graph.check_consistency().map_err(corrupted)?;

        let n = graph.len();
        if table.node_count != n || table.metadata.len() != n {
            return Err(corrupted(format!(
                "graph has {n} nodes, side table records {} nodes and {} entries",
                table.node_count,
                table.metadata.len()
            )));
        }
        if let Some((id, pos)) = table.id_to_position.iter().find(|(_, pos)| **pos >= n) {
            return Err(corrupted(format!("id {id:?} points at missing position {pos}")));
        }

        let state = IndexState {
            graph,
            metadata: table.metadata,
            id_to_position: table.id_to_position.into_iter().collect::<HashMap<_, _>>(),
            exact_search_threshold: table.exact_search_threshold,
        };
        let mut guard = self.state.write();
        *guard = state;
        self.bump_generation();
        drop(guard);

        info!(vectors = n, "Index reloaded");
        Ok(n)
    }
}
