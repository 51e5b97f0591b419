use std::path::PathBuf;

use super::fusion::ScoreFusion;

/// Passage content longer than this many characters is cut before scoring.
pub const DEFAULT_MAX_PASSAGE_CHARS: usize = 500;

/// Token budget for a (query, passage) pair.
pub const MAX_SEQ_LEN: usize = 512;

#[derive(Debug, Clone)]
pub struct RerankerConfig {
    /// Cross-encoder directory. `None` selects the lexical scorer.
    pub model_path: Option<PathBuf>,

    pub max_passage_chars: usize,

    pub max_seq_len: usize,

    pub fusion: ScoreFusion,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            max_passage_chars: DEFAULT_MAX_PASSAGE_CHARS,
            max_seq_len: MAX_SEQ_LEN,
            fusion: ScoreFusion::default(),
        }
    }
}

impl RerankerConfig {
    pub fn new<P: Into<PathBuf>>(model_path: P) -> Self {
        Self {
            model_path: Some(model_path.into()),
            ..Default::default()
        }
    }

    pub fn stub() -> Self {
        Self::default()
    }

    pub fn with_fusion(mut self, fusion: ScoreFusion) -> Self {
        self.fusion = fusion;
        self
    }

    pub fn with_max_passage_chars(mut self, max_chars: usize) -> Self {
        self.max_passage_chars = max_chars;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        self.fusion.validate()?;

        if self.max_passage_chars == 0 {
            return Err("max_passage_chars must be > 0".to_string());
        }
        if self.max_seq_len == 0 {
            return Err("max_seq_len must be > 0".to_string());
        }

        if let Some(ref path) = self.model_path
            && path.as_os_str().is_empty()
        {
            return Err("model_path cannot be empty when provided".to_string());
        }

        Ok(())
    }

    pub fn from_env() -> Self {
        let model_path = std::env::var("FACTLENS_RERANKER_PATH")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let defaults = ScoreFusion::default();
        let weight = |name: &str, default: f32| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };

        Self {
            model_path,
            fusion: ScoreFusion::new(
                weight("FACTLENS_FUSION_SIMILARITY_WEIGHT", defaults.similarity_weight),
                weight("FACTLENS_FUSION_RERANK_WEIGHT", defaults.rerank_weight),
            ),
            ..Default::default()
        }
    }
}
