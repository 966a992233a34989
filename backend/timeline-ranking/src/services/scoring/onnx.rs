/// Compiled scoring backend
///
/// Runs an ONNX-exported scoring model with tract-onnx. Rows the model cannot
/// score (inference failure, non-finite output) are scored by the heuristic
/// formula instead, so a batch always yields one finite score per input.
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use tract_onnx::prelude::*;

use super::{
    HeuristicBackend, RankingError, Result, ScoreBackend, ScoringInput, FEATURE_VECTOR_SIZE,
};

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

pub struct OnnxBackend {
    model: Arc<OnnxPlan>,
    fallback: HeuristicBackend,
}

impl OnnxBackend {
    /// Load and optimize a model from disk
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RankingError::ModelLoadError(format!(
                "Model file not found: {}",
                path.display()
            )));
        }

        let model = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| {
                RankingError::ModelLoadError(format!("{}: {}", path.display(), e))
            })?;

        Ok(Self {
            model: Arc::new(model),
            fallback: HeuristicBackend::default(),
        })
    }

    /// `(n × FEATURE_VECTOR_SIZE)` input tensor, one row per post
    fn features(inputs: &[ScoringInput]) -> Tensor {
        let rows: Vec<Vec<f32>> = inputs.iter().map(ScoringInput::to_vector).collect();
        let matrix = tract_ndarray::Array2::from_shape_fn(
            (inputs.len(), FEATURE_VECTOR_SIZE),
            |(i, j)| rows[i].get(j).copied().unwrap_or(0.0),
        );
        Tensor::from(matrix.into_dyn())
    }

    /// Raw model output, one value per row
    fn infer(&self, features: Tensor) -> Result<Vec<f32>> {
        let batch_size = features.shape().first().copied().unwrap_or(0);

        let output = self
            .model
            .run(tvec![features.into()])
            .map_err(|e| RankingError::InferenceError(format!("ONNX inference failed: {}", e)))?;

        let scores = output[0]
            .to_array_view::<f32>()
            .map_err(|e| RankingError::InferenceError(format!("Output extraction failed: {}", e)))?;

        if scores.len() != batch_size {
            return Err(RankingError::InferenceError(format!(
                "Expected {} scores, got {}",
                batch_size,
                scores.len()
            )));
        }

        Ok(scores.iter().copied().collect())
    }
}

impl ScoreBackend for OnnxBackend {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn is_native(&self) -> bool {
        true
    }

    fn score(&self, input: &ScoringInput) -> f64 {
        self.score_batch(std::slice::from_ref(input))
            .into_iter()
            .next()
            .unwrap_or(0.0)
    }

    fn score_batch(&self, inputs: &[ScoringInput]) -> Vec<f64> {
        if inputs.is_empty() {
            return Vec::new();
        }

        let raw = match self.infer(Self::features(inputs)) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(error = %e, batch = inputs.len(), "Model inference failed, using heuristic");
                return self.fallback.score_batch(inputs);
            }
        };

        raw.into_iter()
            .zip(inputs)
            .map(|(score, input)| {
                let score = score as f64;
                if score.is_finite() {
                    score.max(0.0)
                } else {
                    debug!(score, "Non-finite model output, using heuristic");
                    self.fallback.score(input)
                }
            })
            .collect()
    }
}
