use std::sync::Arc;

use factlens::embedding::{EmbeddingConfig, EmbeddingProvider, MockEmbeddingBackend};
use factlens::evidence::EvidenceRecord;
use factlens::index::{IndexConfig, VectorIndex};
use factlens::retrieval::EvidenceRetriever;

pub const DIM: usize = 64;

pub fn mock_provider() -> Arc<EmbeddingProvider> {
    Arc::new(
        EmbeddingProvider::with_backend(
            Box::new(MockEmbeddingBackend::new(DIM)),
            EmbeddingConfig::stub(DIM),
        )
        .unwrap(),
    )
}

pub fn retriever_with(index: IndexConfig) -> EvidenceRetriever {
    EvidenceRetriever::new(mock_provider(), Arc::new(VectorIndex::new(index).unwrap()))
}

pub fn retriever() -> EvidenceRetriever {
    retriever_with(IndexConfig::new(DIM))
}

/// Same parameters, but every search walks the graph.
pub fn graph_index_config() -> IndexConfig {
    IndexConfig::new(DIM).with_exact_search_threshold(0)
}

pub fn vaccine_corpus() -> Vec<EvidenceRecord> {
    vec![
        EvidenceRecord::new(
            "digital",
            "Digital India initiative",
            "Government expands broadband access in rural districts.",
        )
        .with_source("press-release"),
        EvidenceRecord::new(
            "social",
            "Misinformation on social media",
            "Platforms struggle to moderate viral false claims.",
        )
        .with_source("newswire"),
        EvidenceRecord::new(
            "vaccine",
            "Vaccine safety",
            "Clinical trials and monitoring confirm vaccine safety for the public.",
        )
        .with_source("health-ministry")
        .with_credibility(0.9),
    ]
}

/// `n` short synthetic passages over a handful of topics.
pub fn synthetic_corpus(n: usize) -> Vec<EvidenceRecord> {
    const TOPICS: [&str; 6] = [
        "election turnout figures",
        "monsoon rainfall forecast",
        "vaccine trial results",
        "currency exchange rates",
        "railway safety audit",
        "crop insurance claims",
    ];
    (0..n)
        .map(|i| {
            let topic = TOPICS[i % TOPICS.len()];
            EvidenceRecord::new(
                format!("doc-{i}"),
                format!("Report {i} on {topic}"),
                format!("Passage {i} discusses {topic} in district {}.", i % 17),
            )
        })
        .collect()
}

pub fn ids(records: &[EvidenceRecord]) -> Vec<String> {
    records.iter().map(|r| r.id.clone()).collect()
}
