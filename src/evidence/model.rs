use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_CREDIBILITY_SCORE;

fn default_credibility() -> f32 {
    DEFAULT_CREDIBILITY_SCORE
}

/// Query-time annotations. Never part of the stored form of a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryScores {
    /// Stage-1 similarity in `(0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f32>,
    /// Raw cross-encoder output (unbounded logit).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
    /// Fused score in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combined_score: Option<f32>,
    /// 1-based rank in the final result list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_rank: Option<usize>,
    /// Position in the vector index the record was read from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_position: Option<usize>,
}

impl QueryScores {
    /// Returns `true` when no annotation is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A retrievable passage with provenance metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default = "default_credibility")]
    pub credibility_score: f32,
    /// Precomputed embedding. Dropped from the stored form; the index owns the vector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "QueryScores::is_empty")]
    pub scores: QueryScores,
}

impl EvidenceRecord {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            url: String::new(),
            source: String::new(),
            published_date: None,
            author: None,
            tags: BTreeSet::new(),
            credibility_score: DEFAULT_CREDIBILITY_SCORE,
            embedding: None,
            scores: QueryScores::default(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_published_date(mut self, date: impl Into<String>) -> Self {
        self.published_date = Some(date.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the credibility score, clamped to `[0, 1]`.
    pub fn with_credibility(mut self, score: f32) -> Self {
        self.credibility_score = clamp_unit(score);
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Identifier registered in the index: `id`, or `url` when `id` is empty.
    pub fn external_id(&self) -> &str {
        if self.id.is_empty() {
            &self.url
        } else {
            &self.id
        }
    }

    /// Text that gets embedded at ingest time.
    pub fn embedding_text(&self) -> String {
        format!("{} {}", self.title, self.content).trim().to_string()
    }

    /// Copy suitable for index metadata: no embedding, no query annotations.
    pub fn stored(&self) -> Self {
        let mut record = self.clone();
        record.embedding = None;
        record.scores = QueryScores::default();
        record.credibility_score = clamp_unit(record.credibility_score);
        record
    }

    /// Stage-1 similarity, or `0.0` when the record was not produced by a search.
    pub fn similarity(&self) -> f32 {
        self.scores.similarity_score.unwrap_or(0.0)
    }
}

fn clamp_unit(score: f32) -> f32 {
    if score.is_nan() {
        DEFAULT_CREDIBILITY_SCORE
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Which stages produced a result list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMethod {
    /// Dense recall followed by cross-encoder reranking.
    Hybrid,
    /// Dense recall only (reranker unavailable or failed).
    DenseOnly,
}

impl RankingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RankingMethod::Hybrid => "hybrid",
            RankingMethod::DenseOnly => "dense_only",
        }
    }
}

impl fmt::Display for RankingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ranked output of a hybrid query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub records: Vec<EvidenceRecord>,
    pub ranking_method: RankingMethod,
}

impl QueryResult {
    pub fn new(records: Vec<EvidenceRecord>, ranking_method: RankingMethod) -> Self {
        Self {
            records,
            ranking_method,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// External ids in rank order.
    pub fn ids(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.external_id()).collect()
    }
}
