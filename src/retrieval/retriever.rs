//! Dense (stage-1) evidence retrieval over the vector index.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::embedding::{EmbeddingModelInfo, EmbeddingProvider};
use crate::evidence::EvidenceRecord;
use crate::index::{IndexResult, IndexStats, VectorIndex};

/// Shared cancellation switch for long-running ingestion.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Outcome of [`EvidenceRetriever::add_evidence_chunked`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub submitted: usize,
    pub added: usize,
    /// Records that could not be embedded, or whose chunk the index rejected.
    pub skipped: usize,
    /// Chunks handed to the index.
    pub chunks: usize,
    /// Set when the flag was raised before every chunk ran.
    pub cancelled: bool,
}

/// Index and embedding statistics for a corpus.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusStats {
    pub index: IndexStats,
    pub embedding: EmbeddingModelInfo,
}

struct Prepared {
    vectors: Vec<Vec<f32>>,
    records: Vec<EvidenceRecord>,
    ids: Vec<String>,
    skipped: usize,
}

fn is_zero(v: &[f32]) -> bool {
    v.iter().all(|&x| x == 0.0)
}

/// Embeds evidence on the way in and searches it on the way out.
pub struct EvidenceRetriever {
    provider: Arc<EmbeddingProvider>,
    index: Arc<VectorIndex>,
}

impl std::fmt::Debug for EvidenceRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvidenceRetriever")
            .field("provider", &self.provider)
            .field("index", &self.index)
            .finish()
    }
}

impl EvidenceRetriever {
    pub fn new(provider: Arc<EmbeddingProvider>, index: Arc<VectorIndex>) -> Self {
        Self { provider, index }
    }

    pub fn provider(&self) -> &Arc<EmbeddingProvider> {
        &self.provider
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Splits `records` into embeddable ones (with their vectors) and a skip count.
    ///
    /// Precomputed embeddings are used as given; the rest go through one `encode_batch`.
    fn prepare(&self, records: &[EvidenceRecord]) -> Prepared {
        let dim = self.index.dimension();
        let mut slots: Vec<Option<Vec<f32>>> = Vec::with_capacity(records.len());
        let mut missing: Vec<(usize, String)> = Vec::new();

        for (i, record) in records.iter().enumerate() {
            match &record.embedding {
                Some(embedding) => slots.push(Some(embedding.clone())),
                None => {
                    slots.push(None);
                    missing.push((i, record.embedding_text()));
                }
            }
        }

        if !missing.is_empty() {
            let texts: Vec<&str> = missing.iter().map(|(_, t)| t.as_str()).collect();
            match self.provider.encode_batch(&texts) {
                Ok(vectors) => {
                    for ((i, _), vector) in missing.iter().zip(vectors) {
                        slots[*i] = Some(vector);
                    }
                }
                Err(e) => {
                    warn!(error = %e, records = missing.len(), "Cannot embed evidence");
                }
            }
        }

        let mut prepared = Prepared {
            vectors: Vec::with_capacity(records.len()),
            records: Vec::with_capacity(records.len()),
            ids: Vec::with_capacity(records.len()),
            skipped: 0,
        };
        for (record, slot) in records.iter().zip(slots) {
            let Some(vector) = slot else {
                prepared.skipped += 1;
                continue;
            };
            if vector.len() != dim {
                warn!(
                    id = record.external_id(),
                    expected = dim,
                    actual = vector.len(),
                    "Skipping evidence with wrong embedding dimension"
                );
                prepared.skipped += 1;
                continue;
            }
            if is_zero(&vector) {
                debug!(id = record.external_id(), "Skipping evidence with empty embedding");
                prepared.skipped += 1;
                continue;
            }
            prepared.ids.push(record.external_id().to_string());
            prepared.records.push(record.clone());
            prepared.vectors.push(vector);
        }
        prepared
    }

    /// Returns `(added, skipped)`.
    fn ingest(&self, records: &[EvidenceRecord]) -> IndexResult<(usize, usize)> {
        let prepared = self.prepare(records);
        if prepared.vectors.is_empty() {
            return Ok((0, prepared.skipped));
        }
        self.index
            .add(&prepared.vectors, &prepared.records, Some(&prepared.ids))?;
        Ok((prepared.vectors.len(), prepared.skipped))
    }

    /// Embeds and indexes `records`. Returns `true` if at least one record was added.
    ///
    /// Records that cannot be embedded are skipped. An index error is logged and reported
    /// as `false`; nothing from the batch is written in that case.
    #[instrument(skip_all, fields(records = records.len()))]
    pub fn add_evidence(&self, records: &[EvidenceRecord]) -> bool {
        if records.is_empty() {
            return false;
        }
        match self.ingest(records) {
            Ok((0, skipped)) => {
                warn!(skipped, "No embeddable evidence in batch");
                false
            }
            Ok((added, skipped)) => {
                info!(added, skipped, total = self.index.len(), "Added evidence to corpus");
                true
            }
            Err(e) => {
                error!(error = %e, "Index rejected evidence batch");
                false
            }
        }
    }

    /// Ingests `records` in chunks of `chunk_size`, checking `cancel` before each chunk.
    ///
    /// A chunk is one atomic index write, so cancellation never leaves half a chunk behind.
    #[instrument(skip_all, fields(records = records.len(), chunk_size = chunk_size))]
    pub fn add_evidence_chunked(
        &self,
        records: &[EvidenceRecord],
        chunk_size: usize,
        cancel: &CancelFlag,
    ) -> IngestReport {
        let mut report = IngestReport {
            submitted: records.len(),
            ..Default::default()
        };

        for chunk in records.chunks(chunk_size.max(1)) {
            if cancel.is_cancelled() {
                report.cancelled = true;
                info!(added = report.added, "Ingestion cancelled");
                break;
            }
            report.chunks += 1;
            match self.ingest(chunk) {
                Ok((added, skipped)) => {
                    report.added += added;
                    report.skipped += skipped;
                }
                Err(e) => {
                    error!(error = %e, chunk = chunk.len(), "Index rejected evidence chunk");
                    report.skipped += chunk.len();
                }
            }
        }

        info!(
            added = report.added,
            skipped = report.skipped,
            chunks = report.chunks,
            "Chunked ingestion finished"
        );
        report
    }

    /// Dense search for `query`, keeping hits with `similarity >= min_similarity`.
    ///
    /// Hits carry `similarity_score` and `index_position`. An unembeddable query or an empty
    /// index gives an empty list.
    #[instrument(skip(self, query), fields(query_len = query.len()))]
    pub fn retrieve_evidence(
        &self,
        query: &str,
        top_k: usize,
        min_similarity: f32,
    ) -> Vec<EvidenceRecord> {
        if self.index.is_empty() {
            debug!("Evidence index is empty");
            return Vec::new();
        }

        let vector = match self.provider.encode(query) {
            Ok(v) if is_zero(&v) => {
                debug!("Query has no embeddable content");
                return Vec::new();
            }
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Failed to embed query");
                return Vec::new();
            }
        };

        let hits = match self.index.search(&vector, top_k) {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "Vector search failed");
                return Vec::new();
            }
        };

        let evidence: Vec<EvidenceRecord> = hits
            .into_iter()
            .filter(|hit| hit.similarity >= min_similarity)
            .map(|hit| {
                let mut record = hit.metadata;
                record.scores.similarity_score = Some(hit.similarity);
                record.scores.index_position = Some(hit.position);
                record
            })
            .collect();

        debug!(returned = evidence.len(), "Dense retrieval complete");
        evidence
    }

    /// Stored record registered under `id`, annotated with its index position.
    pub fn get_evidence_by_id(&self, id: &str) -> Option<EvidenceRecord> {
        self.index.get_by_id(id).map(|(position, mut record)| {
            record.scores.index_position = Some(position);
            record
        })
    }

    /// Persists the index into `dir` and flushes the embedding cache file.
    pub fn save_corpus(&self, dir: &Path) -> IndexResult<()> {
        self.index.persist(dir)?;
        if let Err(e) = self.provider.flush() {
            warn!(error = %e, "Embedding cache flush failed");
        }
        Ok(())
    }

    /// Replaces the index contents with the corpus saved in `dir`.
    pub fn load_corpus(&self, dir: &Path) -> IndexResult<usize> {
        self.index.reload(dir)
    }

    pub fn corpus_stats(&self) -> CorpusStats {
        CorpusStats {
            index: self.index.stats(),
            embedding: self.provider.model_info(),
        }
    }
}
