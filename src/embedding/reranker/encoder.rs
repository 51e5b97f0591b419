//! Pairwise relevance scorers.

use std::collections::HashSet;
use std::path::Path;

use candle_core::Device;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use super::error::RerankerError;
use crate::embedding::bert::BertClassifier;
use crate::embedding::device::{device_label, select_device};
use crate::embedding::text::content_tokens;
use crate::embedding::utils::{load_tokenizer_with_truncation, stack_encodings};

/// Scores (query, passage) pairs jointly. Output is a raw, unbounded logit per passage.
pub trait CrossEncoder: Send + Sync {
    fn name(&self) -> &str;

    /// One logit per passage, same order.
    fn score_pairs(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>, RerankerError>;
}

/// candle BERT sequence classifier with a single-logit head.
pub struct BertCrossEncoder {
    model: BertClassifier,
    tokenizer: Tokenizer,
    device: Device,
    name: String,
}

impl std::fmt::Debug for BertCrossEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BertCrossEncoder")
            .field("name", &self.name)
            .field("device", &device_label(&self.device))
            .finish()
    }
}

impl BertCrossEncoder {
    pub fn load(model_path: &Path, max_seq_len: usize) -> Result<Self, RerankerError> {
        if !model_path.exists() {
            return Err(RerankerError::ModelNotFound {
                path: model_path.to_path_buf(),
            });
        }
        for required in ["config.json", "model.safetensors"] {
            if !model_path.join(required).exists() {
                return Err(RerankerError::ModelLoadFailed {
                    reason: format!("Missing {required} in {}", model_path.display()),
                });
            }
        }

        let device = select_device()?;
        debug!(device = device_label(&device), "Selected compute device for reranker");

        let model = BertClassifier::load(model_path, &device).map_err(|e| {
            RerankerError::ModelLoadFailed {
                reason: format!("Failed to load BERT model: {e}"),
            }
        })?;
        let tokenizer = load_tokenizer_with_truncation(model_path, max_seq_len).map_err(|e| {
            RerankerError::ModelLoadFailed {
                reason: format!("Failed to load tokenizer: {e}"),
            }
        })?;

        let name = model_path
            .file_name()
            .map(|n| format!("cross-encoder:{}", n.to_string_lossy()))
            .unwrap_or_else(|| "cross-encoder".to_string());

        info!(model_path = %model_path.display(), "Reranker model loaded");

        Ok(Self {
            model,
            tokenizer,
            device,
            name,
        })
    }
}

impl CrossEncoder for BertCrossEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn score_pairs(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>, RerankerError> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let pairs: Vec<(&str, &str)> = passages.iter().map(|p| (query, *p)).collect();
        let encodings = self.tokenizer.encode_batch(pairs, true).map_err(|e| {
            RerankerError::TokenizationFailed {
                reason: e.to_string(),
            }
        })?;
        let inputs = stack_encodings(&encodings, &self.device)?;

        let logits = self
            .model
            .forward(&inputs.input_ids, &inputs.type_ids, &inputs.attention_mask)?
            .flatten_all()?
            .to_vec1::<f32>()?;

        debug!(pairs = passages.len(), "Cross-encoder forward pass");
        Ok(logits)
    }
}

/// Model-free scorer built on content-token overlap.
///
/// `base = 0.6 * recall + 0.4 * jaccard` over query/passage token sets, mapped to a logit
/// with `8 * (base - 0.5)`, so full overlap lands near `+4` and none at `-4`.
#[derive(Debug, Clone, Default)]
pub struct LexicalCrossEncoder;

impl LexicalCrossEncoder {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, query: &str, passage: &str) -> f32 {
        let query_words: HashSet<String> = content_tokens(query).into_iter().collect();
        if query_words.is_empty() {
            return -4.0;
        }
        let passage_words: HashSet<String> = content_tokens(passage).into_iter().collect();

        let matches = query_words.intersection(&passage_words).count();
        let recall = matches as f32 / query_words.len() as f32;

        let union = query_words.union(&passage_words).count();
        let jaccard = if union > 0 {
            matches as f32 / union as f32
        } else {
            0.0
        };

        let base = 0.6 * recall + 0.4 * jaccard;
        8.0 * (base - 0.5)
    }
}

impl CrossEncoder for LexicalCrossEncoder {
    fn name(&self) -> &str {
        "lexical"
    }

    fn score_pairs(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>, RerankerError> {
        Ok(passages.iter().map(|p| self.score(query, p)).collect())
    }
}
