use thiserror::Error;

use crate::snapshot::SnapshotError;

#[derive(Debug, Error)]
/// Errors returned by [`VectorIndex`](super::VectorIndex) operations.
pub enum IndexError {
    /// Parallel inputs to `add` had different lengths.
    #[error("{field} has {actual} entries, expected {expected}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A vector (or a snapshot) does not have the configured dimension.
    #[error("invalid vector dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Snapshot decoded but its tables disagree with each other.
    #[error("corrupted index snapshot: {reason}")]
    Corrupted { reason: String },

    #[error("invalid index configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("index I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index metadata JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type IndexResult<T> = Result<T, IndexError>;
