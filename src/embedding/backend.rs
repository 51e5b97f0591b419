//! Embedding backends.
//!
//! [`BertEmbedder`] runs a sentence encoder with candle; [`HashingEmbedder`] is a
//! deterministic, model-free stand-in used when no model directory is configured.

use std::path::Path;

use candle_core::Device;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use super::bert::BertSentenceEncoder;
use super::device::{device_label, select_device};
use super::error::{EmbeddingError, EmbeddingResult};
use super::text::content_tokens;
use super::utils::{load_tokenizer_with_truncation, stack_encodings};
use crate::hashing::hash_to_u64;

/// Produces fixed-dimension, unit-norm vectors for batches of text.
pub trait EmbeddingBackend: Send + Sync {
    /// Short identifier reported in model info.
    fn name(&self) -> &str;

    fn dimension(&self) -> usize;

    /// One vector per input, same order. Inputs are never empty strings.
    fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;
}

/// Scales `v` to unit L2 norm in place; zero vectors stay zero.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Signed feature hashing of content tokens and adjacent-token bigrams.
///
/// Texts sharing vocabulary land close together, which is enough for tests and for running
/// the pipeline without model files.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn add_feature(&self, v: &mut [f32], feature: &str, weight: f32) {
        let h = hash_to_u64(feature.as_bytes());
        let slot = (h % self.dimension as u64) as usize;
        let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        v[slot] += sign * weight;
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        let tokens = content_tokens(text);
        for token in &tokens {
            self.add_feature(&mut v, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut v, &format!("{} {}", pair[0], pair[1]), 0.5);
        }
        l2_normalize(&mut v);
        v
    }
}

impl EmbeddingBackend for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Default token budget for the sentence encoder.
pub const BERT_MAX_SEQ_LEN: usize = 256;

/// candle BERT sentence encoder loaded from `config.json`, `model.safetensors` and
/// `tokenizer.json`.
pub struct BertEmbedder {
    model: BertSentenceEncoder,
    tokenizer: Tokenizer,
    device: Device,
    name: String,
}

impl std::fmt::Debug for BertEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BertEmbedder")
            .field("name", &self.name)
            .field("device", &device_label(&self.device))
            .field("dimension", &self.model.hidden_size())
            .finish()
    }
}

impl BertEmbedder {
    pub fn load(model_dir: &Path, max_seq_len: usize) -> EmbeddingResult<Self> {
        for required in ["config.json", "model.safetensors", "tokenizer.json"] {
            if !model_dir.join(required).exists() {
                return Err(EmbeddingError::ModelNotFound {
                    path: model_dir.join(required),
                });
            }
        }

        let device = select_device()?;
        let model = BertSentenceEncoder::load(model_dir, &device).map_err(|e| {
            EmbeddingError::ModelLoadFailed {
                reason: format!("Failed to load BERT encoder: {e}"),
            }
        })?;
        let tokenizer = load_tokenizer_with_truncation(model_dir, max_seq_len).map_err(|e| {
            EmbeddingError::TokenizationFailed {
                reason: format!("Failed to load tokenizer: {e}"),
            }
        })?;

        let name = model_dir
            .file_name()
            .map(|n| format!("bert:{}", n.to_string_lossy()))
            .unwrap_or_else(|| "bert".to_string());

        info!(
            model_dir = %model_dir.display(),
            dimension = model.hidden_size(),
            device = device_label(&device),
            "Sentence encoder loaded"
        );

        Ok(Self {
            model,
            tokenizer,
            device,
            name,
        })
    }
}

impl EmbeddingBackend for BertEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.model.hidden_size()
    }

    fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbeddingError::TokenizationFailed {
                reason: e.to_string(),
            })?;
        let inputs = stack_encodings(&encodings, &self.device)?;

        debug!(
            batch = texts.len(),
            seq_len = encodings.first().map(|e| e.len()).unwrap_or(0),
            "Sentence encoder forward pass"
        );

        let pooled = self
            .model
            .forward(&inputs.input_ids, &inputs.type_ids, &inputs.attention_mask)?
            .to_vec2::<f32>()?;

        Ok(pooled
            .into_iter()
            .map(|mut v| {
                l2_normalize(&mut v);
                v
            })
            .collect())
    }
}
