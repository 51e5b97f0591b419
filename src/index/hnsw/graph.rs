//! HNSW graph storage and build parameters.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Neighbor fan-out per node above layer 0.
pub const DEFAULT_M: usize = 32;

/// Candidate list size while inserting.
pub const DEFAULT_EF_CONSTRUCTION: usize = 200;

/// Candidate list size while searching.
pub const DEFAULT_EF_SEARCH: usize = 128;

pub const DEFAULT_MAX_LAYERS: usize = 16;

pub const DEFAULT_SEED: u64 = 0x5eed_f4c7_1e45;

/// Tuning knobs for graph construction and search.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Serialize,
    Deserialize,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
pub struct HnswConfig {
    /// Links per node on layers above 0.
    pub m: usize,
    /// Links per node on layer 0 (typically `2 * m`).
    pub m_max0: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub max_layers: usize,
    /// Seed for level assignment. Same seed and insertion order give the same graph.
    pub seed: u64,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: DEFAULT_M,
            m_max0: DEFAULT_M * 2,
            ef_construction: DEFAULT_EF_CONSTRUCTION,
            ef_search: DEFAULT_EF_SEARCH,
            max_layers: DEFAULT_MAX_LAYERS,
            seed: DEFAULT_SEED,
        }
    }
}

impl HnswConfig {
    /// Sets `m` and keeps `m_max0 = 2 * m`.
    pub fn with_m(mut self, m: usize) -> Self {
        self.m = m;
        self.m_max0 = m * 2;
        self
    }

    pub fn with_ef_construction(mut self, ef: usize) -> Self {
        self.ef_construction = ef;
        self
    }

    pub fn with_ef_search(mut self, ef: usize) -> Self {
        self.ef_search = ef;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.m < 2 {
            return Err(format!("m must be >= 2, got {}", self.m));
        }
        if self.m_max0 < self.m {
            return Err(format!(
                "m_max0 ({}) must be >= m ({})",
                self.m_max0, self.m
            ));
        }
        if self.ef_construction == 0 || self.ef_search == 0 {
            return Err("ef_construction and ef_search must be > 0".to_string());
        }
        if self.max_layers == 0 || self.max_layers > u8::MAX as usize {
            return Err(format!(
                "max_layers must be in 1..=255, got {}",
                self.max_layers
            ));
        }
        Ok(())
    }
}

/// Layered proximity graph over full-precision vectors.
///
/// Node `i` owns `vectors[i * dimension..(i + 1) * dimension]`, `levels[i]` and
/// `neighbors[i][layer]` for every `layer <= levels[i]`.
#[derive(Debug, Clone, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct HnswGraph {
    pub config: HnswConfig,
    pub dimension: usize,
    pub vectors: Vec<f32>,
    pub neighbors: Vec<Vec<Vec<u32>>>,
    pub levels: Vec<u8>,
    pub entry_point: Option<u32>,
    pub max_layer: usize,
}

impl HnswGraph {
    pub fn new(dimension: usize, config: HnswConfig) -> Self {
        Self {
            config,
            dimension,
            vectors: Vec::new(),
            neighbors: Vec::new(),
            levels: Vec::new(),
            entry_point: None,
            max_layer: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    #[inline]
    pub fn vector(&self, id: u32) -> &[f32] {
        let start = id as usize * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    #[inline]
    pub fn neighbors_at(&self, id: u32, layer: usize) -> &[u32] {
        self.neighbors[id as usize]
            .get(layer)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn max_links(&self, layer: usize) -> usize {
        if layer == 0 {
            self.config.m_max0
        } else {
            self.config.m
        }
    }

    /// Level for node `id`: `floor(-ln(u) / ln(m))`, `u` drawn from an RNG seeded by
    /// `(seed, id)`, capped at `max_layers - 1`.
    pub fn level_for(&self, id: u32) -> usize {
        let stream = u64::from(id).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        let mut rng = StdRng::seed_from_u64(self.config.seed ^ stream);
        let u: f64 = 1.0 - rng.r#gen::<f64>();
        let ml = 1.0 / (self.config.m as f64).ln();
        let level = (-u.ln() * ml).floor() as usize;
        level.min(self.config.max_layers - 1)
    }

    /// Structural checks run after decoding a snapshot.
    pub fn check_consistency(&self) -> Result<(), String> {
        let n = self.len();
        if self.vectors.len() != n * self.dimension {
            return Err(format!(
                "{} floats for {} nodes at dimension {}",
                self.vectors.len(),
                n,
                self.dimension
            ));
        }
        if self.neighbors.len() != n {
            return Err(format!("{} adjacency lists for {} nodes", self.neighbors.len(), n));
        }
        match self.entry_point {
            None if n > 0 => return Err("non-empty graph without entry point".to_string()),
            Some(ep) if ep as usize >= n => {
                return Err(format!("entry point {ep} out of range"));
            }
            _ => {}
        }
        for (id, layers) in self.neighbors.iter().enumerate() {
            if layers.len() != self.levels[id] as usize + 1 {
                return Err(format!(
                    "node {id} has {} layers, level {}",
                    layers.len(),
                    self.levels[id]
                ));
            }
            if let Some(bad) = layers.iter().flatten().find(|&&nb| nb as usize >= n) {
                return Err(format!("node {id} links to missing node {bad}"));
            }
        }
        Ok(())
    }
}
