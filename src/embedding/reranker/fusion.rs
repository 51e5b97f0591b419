use serde::{Deserialize, Serialize};

/// Weight of the stage-1 similarity in the fused score.
pub const DEFAULT_SIMILARITY_WEIGHT: f32 = 0.3;

/// Weight of the squashed cross-encoder logit in the fused score.
pub const DEFAULT_RERANK_WEIGHT: f32 = 0.7;

#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Linear fusion of a bounded similarity with an unbounded cross-encoder logit.
///
/// `combined = w_sim * similarity + w_rerank * sigmoid(logit)`, clamped to `[0, 1]`. With
/// non-negative weights the result is monotone in both inputs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreFusion {
    pub similarity_weight: f32,
    pub rerank_weight: f32,
}

impl Default for ScoreFusion {
    fn default() -> Self {
        Self {
            similarity_weight: DEFAULT_SIMILARITY_WEIGHT,
            rerank_weight: DEFAULT_RERANK_WEIGHT,
        }
    }
}

impl ScoreFusion {
    pub fn new(similarity_weight: f32, rerank_weight: f32) -> Self {
        Self {
            similarity_weight,
            rerank_weight,
        }
    }

    pub fn combine(&self, similarity: f32, rerank_logit: f32) -> f32 {
        let combined =
            self.similarity_weight * similarity + self.rerank_weight * sigmoid(rerank_logit);
        if combined.is_nan() {
            return similarity.clamp(0.0, 1.0);
        }
        combined.clamp(0.0, 1.0)
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, w) in [
            ("similarity_weight", self.similarity_weight),
            ("rerank_weight", self.rerank_weight),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(format!("{name} must be a non-negative number, got {w}"));
            }
        }
        if self.similarity_weight + self.rerank_weight == 0.0 {
            return Err("fusion weights cannot both be zero".to_string());
        }
        Ok(())
    }
}
