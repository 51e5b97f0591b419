use serde::Serialize;

/// What [`Engine::shutdown`](super::Engine::shutdown) did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Background tasks stopped (sweepers plus the flush task).
    pub stopped_tasks: usize,
    /// Entries written by the final embedding-cache flush.
    pub flushed_embeddings: usize,
    /// Whether the index was saved.
    pub persisted: bool,
}
