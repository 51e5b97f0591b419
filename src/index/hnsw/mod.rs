//! Hierarchical Navigable Small World graph over full-precision vectors.
//!
//! Distances are squared L2. Nodes are addressed by their insertion position, which is also
//! their metadata position in [`crate::index::VectorIndex`].

/// Squared L2 distance and the derived similarity.
pub mod distance;
/// Graph storage and configuration.
pub mod graph;
/// Insertion with bidirectional links and heuristic pruning.
pub mod insert;
/// Layer search, k-NN search and exhaustive search.
pub mod search;
/// Generation-based visited set.
pub mod visited;

pub use distance::{similarity_from_distance, squared_l2};
pub use graph::{
    DEFAULT_EF_CONSTRUCTION, DEFAULT_EF_SEARCH, DEFAULT_M, HnswConfig, HnswGraph,
};
pub use search::{exact_search, knn_search};
