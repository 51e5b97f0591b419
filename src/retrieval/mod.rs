//! Evidence retrieval pipeline.
//!
//! [`EvidenceRetriever`] embeds evidence into the [`crate::index::VectorIndex`] and answers
//! dense queries against it. [`HybridRetriever`] widens the dense recall set and narrows it
//! again with the cross-encoder [`crate::embedding::Reranker`].

pub mod hybrid;
pub mod retriever;


pub use hybrid::{HybridRetriever, PerformanceStats};
pub use retriever::{CancelFlag, CorpusStats, EvidenceRetriever, IngestReport};
