//! Stage-2 reranking: cross-encoder scores fused with stage-1 similarity.

pub mod config;
pub mod encoder;
pub mod error;
pub mod fusion;

#[cfg(test)]
mod tests;

pub use config::{DEFAULT_MAX_PASSAGE_CHARS, MAX_SEQ_LEN, RerankerConfig};
pub use encoder::{BertCrossEncoder, CrossEncoder, LexicalCrossEncoder};
pub use error::{RerankerError, RerankerResult};
pub use fusion::{DEFAULT_RERANK_WEIGHT, DEFAULT_SIMILARITY_WEIGHT, ScoreFusion, sigmoid};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::embedding::text::truncate_chars;
use crate::evidence::EvidenceRecord;

/// Reported by [`Reranker::model_info`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RerankerModelInfo {
    /// Scorer name, `None` when no scorer is loaded.
    pub backend: Option<String>,
    pub model_loaded: bool,
    pub model_type: &'static str,
    pub fusion: ScoreFusion,
}

/// Reorders stage-1 candidates by fused cross-encoder relevance.
pub struct Reranker {
    encoder: Option<Box<dyn CrossEncoder>>,
    config: RerankerConfig,
}

impl std::fmt::Debug for Reranker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reranker")
            .field("backend", &self.backend_name())
            .field("config", &self.config)
            .finish()
    }
}

impl Reranker {
    /// Loads the BERT cross-encoder when `model_path` is set, the lexical scorer otherwise.
    pub fn load(config: RerankerConfig) -> RerankerResult<Self> {
        config
            .validate()
            .map_err(|reason| RerankerError::InvalidConfig { reason })?;

        let encoder: Box<dyn CrossEncoder> = match &config.model_path {
            Some(path) => {
                info!(model_path = %path.display(), "Loading reranker model");
                Box::new(BertCrossEncoder::load(path, config.max_seq_len)?)
            }
            None => {
                info!("No reranker model path configured, operating in stub mode");
                Box::new(LexicalCrossEncoder::new())
            }
        };

        Ok(Self {
            encoder: Some(encoder),
            config,
        })
    }

    /// Like [`Reranker::load`], but a scorer that fails to load leaves the reranker in
    /// passthrough mode.
    pub fn load_or_degrade(config: RerankerConfig) -> Self {
        match Self::load(config.clone()) {
            Ok(reranker) => reranker,
            Err(e) => {
                warn!(error = %e, "Reranker failed to load, results will be dense-only");
                Self::unavailable(config)
            }
        }
    }

    /// Lexical scorer with default fusion weights.
    pub fn stub() -> Self {
        Self {
            encoder: Some(Box::new(LexicalCrossEncoder::new())),
            config: RerankerConfig::stub(),
        }
    }

    pub fn with_encoder(
        encoder: Box<dyn CrossEncoder>,
        config: RerankerConfig,
    ) -> RerankerResult<Self> {
        config
            .validate()
            .map_err(|reason| RerankerError::InvalidConfig { reason })?;
        Ok(Self {
            encoder: Some(encoder),
            config,
        })
    }

    /// No scorer: [`Reranker::rerank`] passes candidates through untouched.
    pub fn unavailable(config: RerankerConfig) -> Self {
        Self {
            encoder: None,
            config,
        }
    }

    pub fn is_model_loaded(&self) -> bool {
        self.encoder.is_some()
    }

    pub fn backend_name(&self) -> Option<&str> {
        self.encoder.as_deref().map(|e| e.name())
    }

    pub fn config(&self) -> &RerankerConfig {
        &self.config
    }

    pub fn fusion(&self) -> ScoreFusion {
        self.config.fusion
    }

    /// `"{title} {content}"` with content cut to `max_passage_chars`.
    pub fn passage_text(&self, record: &EvidenceRecord) -> String {
        let content = truncate_chars(&record.content, self.config.max_passage_chars);
        format!("{} {}", record.title, content).trim().to_string()
    }

    /// Scores, fuses and sorts `passages`; surfaces scorer errors.
    ///
    /// Each output record carries `rerank_score` (raw logit) and `combined_score`. Ties keep
    /// input order.
    #[instrument(skip(self, query, passages), fields(passages = passages.len()))]
    pub fn try_rerank(
        &self,
        query: &str,
        passages: &[EvidenceRecord],
        top_k: Option<usize>,
    ) -> RerankerResult<Vec<EvidenceRecord>> {
        let encoder = self
            .encoder
            .as_deref()
            .ok_or_else(|| RerankerError::NotAvailable {
                reason: "no cross-encoder loaded".to_string(),
            })?;

        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = passages.iter().map(|p| self.passage_text(p)).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let logits = encoder.score_pairs(query, &refs)?;
        if logits.len() != passages.len() {
            return Err(RerankerError::ScoreCountMismatch {
                expected: passages.len(),
                actual: logits.len(),
            });
        }

        let fusion = self.config.fusion;
        let mut reranked: Vec<EvidenceRecord> = passages
            .iter()
            .zip(logits)
            .map(|(passage, logit)| {
                let mut record = passage.clone();
                record.scores.rerank_score = Some(logit);
                record.scores.combined_score = Some(fusion.combine(record.similarity(), logit));
                record
            })
            .collect();

        reranked.sort_by(|a, b| {
            let a = a.scores.combined_score.unwrap_or(0.0);
            let b = b.scores.combined_score.unwrap_or(0.0);
            b.total_cmp(&a)
        });
        if let Some(k) = top_k {
            reranked.truncate(k);
        }

        debug!(
            scorer = encoder.name(),
            returned = reranked.len(),
            top_score = reranked.first().and_then(|r| r.scores.combined_score),
            "Reranking complete"
        );
        Ok(reranked)
    }

    /// Like [`Reranker::try_rerank`], but any failure returns `passages` unchanged.
    pub fn rerank(
        &self,
        query: &str,
        passages: &[EvidenceRecord],
        top_k: Option<usize>,
    ) -> Vec<EvidenceRecord> {
        match self.try_rerank(query, passages, top_k) {
            Ok(reranked) => reranked,
            Err(RerankerError::NotAvailable { .. }) => {
                debug!("Cross-encoder not available, returning original ranking");
                passages.to_vec()
            }
            Err(e) => {
                warn!(error = %e, "Reranking failed, returning original ranking");
                passages.to_vec()
            }
        }
    }

    /// Reranks each passage list against its query. Mismatched lengths return the lists
    /// unchanged.
    pub fn batch_rerank(
        &self,
        queries: &[&str],
        passage_lists: &[Vec<EvidenceRecord>],
        top_k: Option<usize>,
    ) -> Vec<Vec<EvidenceRecord>> {
        if queries.len() != passage_lists.len() {
            warn!(
                queries = queries.len(),
                passage_lists = passage_lists.len(),
                "Query count does not match passage list count"
            );
            return passage_lists.to_vec();
        }

        queries
            .iter()
            .zip(passage_lists)
            .map(|(query, passages)| self.rerank(query, passages, top_k))
            .collect()
    }

    pub fn model_info(&self) -> RerankerModelInfo {
        RerankerModelInfo {
            backend: self.backend_name().map(str::to_string),
            model_loaded: self.is_model_loaded(),
            model_type: "cross_encoder",
            fusion: self.config.fusion,
        }
    }
}
