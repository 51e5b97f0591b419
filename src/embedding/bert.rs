//! candle BERT models: a mean-pooled sentence encoder and a single-logit pair classifier.

use std::path::Path;
use std::sync::Arc;

use candle_core::{DType, Device, IndexOp, Result, Tensor};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config};

fn read_config(model_dir: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(model_dir.join("config.json"))?;
    serde_json::from_str(&raw)
        .map_err(|e| candle_core::Error::Msg(format!("Failed to parse config.json: {e}")))
}

fn var_builder(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let weights = model_dir.join("model.safetensors");
    // SAFETY: the weights file is treated as read-only for the lifetime of the model.
    unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, device) }
}

/// Checkpoints come with or without a `bert.`/`roberta.` prefix.
fn load_encoder(vb: VarBuilder, config: &Config) -> Result<BertModel> {
    if vb.contains_tensor("bert.embeddings.word_embeddings.weight") {
        BertModel::load(vb.pp("bert"), config)
    } else if vb.contains_tensor("roberta.embeddings.word_embeddings.weight") {
        BertModel::load(vb.pp("roberta"), config)
    } else {
        BertModel::load(vb, config)
    }
}

/// Sentence encoder: masked mean over the last hidden layer.
#[derive(Clone)]
pub struct BertSentenceEncoder {
    model: Arc<BertModel>,
    hidden_size: usize,
}

impl BertSentenceEncoder {
    pub fn load<P: AsRef<Path>>(model_dir: P, device: &Device) -> Result<Self> {
        let model_dir = model_dir.as_ref();
        let config = read_config(model_dir)?;
        let model = load_encoder(var_builder(model_dir, device)?, &config)?;
        Ok(Self {
            model: Arc::new(model),
            hidden_size: config.hidden_size,
        })
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// Returns `[batch, hidden]` pooled embeddings (not normalized).
    pub fn forward(
        &self,
        input_ids: &Tensor,
        token_type_ids: &Tensor,
        attention_mask: &Tensor,
    ) -> Result<Tensor> {
        let hidden = self
            .model
            .forward(input_ids, token_type_ids, Some(attention_mask))?;
        let mask = attention_mask.to_dtype(DType::F32)?.unsqueeze(2)?;
        let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
        let counts = mask.sum(1)?.clamp(1e-9f32, f32::MAX)?;
        summed.broadcast_div(&counts)
    }
}

struct PairClassifier {
    bert: BertModel,
    head: Linear,
}

/// Cross-encoder: `[CLS]` state through a one-unit linear head, i.e. one raw logit per pair.
#[derive(Clone)]
pub struct BertClassifier(Arc<PairClassifier>);

impl BertClassifier {
    pub fn load<P: AsRef<Path>>(model_dir: P, device: &Device) -> Result<Self> {
        let model_dir = model_dir.as_ref();
        let config = read_config(model_dir)?;
        let vb = var_builder(model_dir, device)?;
        let bert = load_encoder(vb.clone(), &config)?;
        let head = candle_nn::linear(config.hidden_size, 1, vb.pp("classifier"))?;
        Ok(Self(Arc::new(PairClassifier { bert, head })))
    }

    /// Returns `[batch, 1]` logits.
    pub fn forward(
        &self,
        input_ids: &Tensor,
        token_type_ids: &Tensor,
        attention_mask: &Tensor,
    ) -> Result<Tensor> {
        let hidden = self
            .0
            .bert
            .forward(input_ids, token_type_ids, Some(attention_mask))?;
        let cls = hidden.i((.., 0, ..))?;
        self.0.head.forward(&cls)
    }
}
