use std::io;
use std::path::Path;

use candle_core::{Device, Tensor};
use tokenizers::{Encoding, PaddingParams, Tokenizer, TruncationParams};

use super::error::EmbeddingError;

/// Loads `tokenizer.json` from a model directory (or takes an explicit file path).
pub fn load_tokenizer(model_path: &Path) -> io::Result<Tokenizer> {
    let tokenizer_path = if model_path
        .file_name()
        .is_some_and(|name| name == std::ffi::OsStr::new("tokenizer.json"))
    {
        model_path.to_path_buf()
    } else if model_path.is_dir() {
        model_path.join("tokenizer.json")
    } else {
        model_path
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Model path has no parent"))?
            .join("tokenizer.json")
    };

    Tokenizer::from_file(&tokenizer_path).map_err(io::Error::other)
}

/// Loads a tokenizer that truncates to `max_len` tokens and pads batches to the longest.
pub fn load_tokenizer_with_truncation(model_path: &Path, max_len: usize) -> io::Result<Tokenizer> {
    let mut tokenizer = load_tokenizer(model_path)?;

    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: max_len,
            ..Default::default()
        }))
        .map_err(|e| io::Error::other(format!("Failed to configure truncation: {e}")))?;
    tokenizer.with_padding(Some(PaddingParams::default()));

    Ok(tokenizer)
}

/// `[batch, seq]` input tensors for a BERT forward pass.
pub struct BatchInputs {
    pub input_ids: Tensor,
    pub type_ids: Tensor,
    pub attention_mask: Tensor,
}

fn stack_rows(
    encodings: &[Encoding],
    device: &Device,
    field: fn(&Encoding) -> &[u32],
) -> Result<Tensor, EmbeddingError> {
    let rows = encodings
        .iter()
        .map(|e| Tensor::new(field(e), device))
        .collect::<candle_core::Result<Vec<_>>>()?;
    Ok(Tensor::stack(&rows, 0)?)
}

/// Stacks padded encodings into `[batch, seq]` tensors.
pub fn stack_encodings(
    encodings: &[Encoding],
    device: &Device,
) -> Result<BatchInputs, EmbeddingError> {
    Ok(BatchInputs {
        input_ids: stack_rows(encodings, device, Encoding::get_ids)?,
        type_ids: stack_rows(encodings, device, Encoding::get_type_ids)?,
        attention_mask: stack_rows(encodings, device, Encoding::get_attention_mask)?,
    })
}
