/// Scoring Module
///
/// Maps a post's feature vector to a single non-negative relevance score.
///
/// # Architecture
/// - **Compiled path**: ONNX model inference with tract-onnx (`OnnxBackend`)
/// - **Portable path**: hand-tuned multi-factor formula (`HeuristicBackend`)
/// - **Selection**: `shared_backend` loads the compiled model once per process
///   and falls back to the portable formula when it cannot be loaded
///
/// Callers only ever see `dyn ScoreBackend` and must not depend on which
/// implementation is active.
pub mod heuristic;
pub mod onnx;

pub use heuristic::{HeuristicBackend, HeuristicWeights};
pub use onnx::OnnxBackend;

use once_cell::sync::OnceCell;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::RankingConfig;

#[derive(Debug, Error)]
pub enum RankingError {
    #[error("Model loading failed: {0}")]
    ModelLoadError(String),

    #[error("Model inference failed: {0}")]
    InferenceError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] envy::Error),
}

pub type Result<T> = std::result::Result<T, RankingError>;

/// Feature vector size of `ScoringInput::to_vector`
pub const FEATURE_VECTOR_SIZE: usize = 32;

/// Every argument of the scoring function, in its fixed positional order.
///
/// The random draw is an input like any other, so scoring is a pure function
/// of this struct. `now` is the evaluation instant (unix seconds).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoringInput {
    pub created_at: i64,
    pub like_count: u64,
    pub repost_count: u64,
    pub reply_count: u64,
    pub quote_count: u64,
    pub has_media: bool,
    /// `-1.0` when never seen
    pub hours_since_seen: f64,
    pub author_repeats: u32,
    pub content_repeats: u32,
    pub novelty_factor: f64,
    /// Caller-supplied draw in [0, 1]
    pub random_factor: f64,
    pub all_seen: bool,

    // Extended features
    pub verified: bool,
    pub gold: bool,
    pub follower_count: u64,
    pub has_community_note: bool,
    pub super_poster_boost: f64,
    pub blocked_by_count: u64,
    pub muted_by_count: u64,
    pub spam_score: f64,
    pub account_age_days: f64,
    pub url_count: u32,
    pub suspicious_url_count: u32,
    pub hashtag_count: u32,
    pub mention_count: u32,
    pub emoji_density: f64,
    pub cluster_size: u32,
    pub spam_keyword_score: f64,
    pub repost_like_ratio: f64,
    pub engagement_velocity: f64,
    pub is_video: bool,

    pub now: i64,
}

impl ScoringInput {
    /// Post age in hours at `now`; never negative
    pub fn age_hours(&self) -> f64 {
        (self.now.saturating_sub(self.created_at) as f64 / 3600.0).max(0.0)
    }

    pub fn total_engagement(&self) -> u64 {
        self.like_count
            .saturating_add(self.repost_count)
            .saturating_add(self.reply_count)
            .saturating_add(self.quote_count)
    }

    /// Convert to the model's input row.
    ///
    /// The creation instant is encoded as age in hours so the row does not
    /// depend on the wall clock.
    pub fn to_vector(&self) -> Vec<f32> {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        vec![
            self.age_hours() as f32,
            self.like_count as f32,
            self.repost_count as f32,
            self.reply_count as f32,
            self.quote_count as f32,
            flag(self.has_media),
            self.hours_since_seen as f32,
            self.author_repeats as f32,
            self.content_repeats as f32,
            self.novelty_factor as f32,
            self.random_factor as f32,
            flag(self.all_seen),
            flag(self.verified),
            flag(self.gold),
            self.follower_count as f32,
            flag(self.has_community_note),
            self.super_poster_boost as f32,
            self.blocked_by_count as f32,
            self.muted_by_count as f32,
            self.spam_score as f32,
            self.account_age_days as f32,
            self.url_count as f32,
            self.suspicious_url_count as f32,
            self.hashtag_count as f32,
            self.mention_count as f32,
            self.emoji_density as f32,
            self.cluster_size as f32,
            self.spam_keyword_score as f32,
            self.repost_like_ratio as f32,
            self.engagement_velocity as f32,
            flag(self.is_video),
            // reserved: position in feed, unknown before ranking
            0.0,
        ]
    }
}

/// One implementation of the scoring function
#[cfg_attr(test, mockall::automock)]
pub trait ScoreBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// True for the compiled (model-backed) implementation
    fn is_native(&self) -> bool;

    /// Non-negative, finite score
    fn score(&self, input: &ScoringInput) -> f64;

    fn score_batch(&self, inputs: &[ScoringInput]) -> Vec<f64> {
        inputs.iter().map(|input| self.score(input)).collect()
    }
}

static SHARED_BACKEND: OnceCell<Arc<dyn ScoreBackend>> = OnceCell::new();

/// Process-wide backend, initialised on first use and never replaced.
///
/// Later calls return the first backend regardless of `config`.
pub fn shared_backend(config: &RankingConfig) -> Arc<dyn ScoreBackend> {
    SHARED_BACKEND
        .get_or_init(|| select_backend(config))
        .clone()
}

/// Probe the compiled model and fall back to the heuristic formula
pub fn select_backend(config: &RankingConfig) -> Arc<dyn ScoreBackend> {
    let Some(path) = config.model_path.as_deref() else {
        info!("No scoring model configured, using heuristic scoring");
        return Arc::new(HeuristicBackend::default());
    };

    match OnnxBackend::load(path) {
        Ok(backend) => {
            info!(path = %path.display(), "Loaded ONNX scoring model");
            Arc::new(backend)
        }
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Failed to load ONNX scoring model, falling back to heuristic scoring"
            );
            Arc::new(HeuristicBackend::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_feature_vector_layout() {
        let input = ScoringInput {
            created_at: 0,
            now: 7200,
            like_count: 100,
            repost_count: 20,
            has_media: true,
            hours_since_seen: -1.0,
            all_seen: true,
            follower_count: 1000,
            is_video: true,
            ..Default::default()
        };

        let vector = input.to_vector();

        assert_eq!(vector.len(), FEATURE_VECTOR_SIZE);
        assert_eq!(vector[0], 2.0); // age in hours
        assert_eq!(vector[1], 100.0); // like_count
        assert_eq!(vector[2], 20.0); // repost_count
        assert_eq!(vector[5], 1.0); // has_media
        assert_eq!(vector[6], -1.0); // never seen
        assert_eq!(vector[11], 1.0); // all_seen
        assert_eq!(vector[14], 1000.0); // follower_count
        assert_eq!(vector[30], 1.0); // is_video
    }

    #[test]
    fn test_future_created_at_has_zero_age() {
        let input = ScoringInput {
            created_at: 10_000,
            now: 0,
            ..Default::default()
        };
        assert_eq!(input.age_hours(), 0.0);
    }

    #[test]
    fn test_total_engagement_saturates() {
        let input = ScoringInput {
            like_count: u64::MAX,
            repost_count: 3,
            reply_count: u64::MAX,
            ..Default::default()
        };
        assert_eq!(input.total_engagement(), u64::MAX);

        let score = HeuristicBackend::default().score(&input);
        assert!(score.is_finite() && score > 0.0);
    }

    #[test]
    fn test_select_backend_without_model_is_heuristic() {
        let backend = select_backend(&RankingConfig::default());
        assert!(!backend.is_native());
        assert_eq!(backend.name(), "heuristic");
    }

    #[test]
    fn test_select_backend_missing_model_falls_back() {
        let config = RankingConfig {
            model_path: Some(PathBuf::from("/nonexistent/timeline-ranking.onnx")),
            ..Default::default()
        };

        let backend = select_backend(&config);

        assert!(!backend.is_native());
        let input = ScoringInput {
            created_at: 0,
            now: 3600,
            like_count: 5,
            ..Default::default()
        };
        assert!(backend.score(&input) > 0.0);
    }

    #[test]
    fn test_shared_backend_is_initialised_once() {
        let first = shared_backend(&RankingConfig::default());
        let second = shared_backend(&RankingConfig {
            model_path: Some(PathBuf::from("/nonexistent/other.onnx")),
            ..Default::default()
        });

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_default_score_batch_matches_single_scores() {
        let backend = HeuristicBackend::default();
        let inputs: Vec<ScoringInput> = (0..4)
            .map(|i| ScoringInput {
                created_at: 0,
                now: 3600 * (i + 1),
                like_count: 10 * i as u64,
                random_factor: 0.5,
                ..Default::default()
            })
            .collect();

        let batch = backend.score_batch(&inputs);
        let single: Vec<f64> = inputs.iter().map(|i| backend.score(i)).collect();

        assert_eq!(batch, single);
    }
}
