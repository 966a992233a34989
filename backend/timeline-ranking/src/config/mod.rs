use serde::Deserialize;
use std::path::PathBuf;

use crate::RankingError;

/// Environment prefix for every ranking setting, e.g. `TIMELINE_RANKING_MODEL_PATH`.
pub const ENV_PREFIX: &str = "TIMELINE_RANKING_";

#[derive(Debug, Clone, Deserialize)]
pub struct RankingConfig {
    /// Compiled scoring model (ONNX). `None` selects the heuristic backend.
    #[serde(default)]
    pub model_path: Option<PathBuf>,

    /// Strict mode: without the compiled backend, return batches unscored.
    #[serde(default)]
    pub require_native: bool,

    #[serde(default = "default_display_limit")]
    pub default_display_limit: usize,

    #[serde(default = "default_max_display_limit")]
    pub max_display_limit: usize,

    #[serde(default = "default_min_candidate_pool")]
    pub min_candidate_pool: usize,

    #[serde(default = "default_candidate_pool_multiplier")]
    pub candidate_pool_multiplier: usize,

    /// Number of leading slots eligible for the jitter pass
    #[serde(default = "default_jitter_window")]
    pub jitter_window: usize,

    #[serde(default = "default_jitter_swap_probability")]
    pub jitter_swap_probability: f64,

    /// Upper bound of the random factor applied during greedy selection
    #[serde(default = "default_selection_noise")]
    pub selection_noise: f64,
}

fn default_display_limit() -> usize {
    10
}

fn default_max_display_limit() -> usize {
    60
}

fn default_min_candidate_pool() -> usize {
    20
}

fn default_candidate_pool_multiplier() -> usize {
    3
}

fn default_jitter_window() -> usize {
    4
}

fn default_jitter_swap_probability() -> f64 {
    0.35
}

fn default_selection_noise() -> f64 {
    0.05
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            require_native: false,
            default_display_limit: default_display_limit(),
            max_display_limit: default_max_display_limit(),
            min_candidate_pool: default_min_candidate_pool(),
            candidate_pool_multiplier: default_candidate_pool_multiplier(),
            jitter_window: default_jitter_window(),
            jitter_swap_probability: default_jitter_swap_probability(),
            selection_noise: default_selection_noise(),
        }
    }
}

impl RankingConfig {
    /// Load from `TIMELINE_RANKING_*` variables, reading `.env` first when present.
    pub fn from_env() -> Result<Self, RankingError> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Load from an explicit set of key/value pairs (prefixed names).
    pub fn from_vars<I>(vars: I) -> Result<Self, RankingError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: RankingConfig = envy::prefixed(ENV_PREFIX).from_iter(vars)?;
        config.validated()
    }

    fn validated(mut self) -> Result<Self, RankingError> {
        if self.max_display_limit == 0 {
            return Err(RankingError::InvalidInput(
                "max_display_limit must be at least 1".to_string(),
            ));
        }
        self.default_display_limit = self.default_display_limit.clamp(1, self.max_display_limit);
        self.jitter_swap_probability = self.jitter_swap_probability.clamp(0.0, 1.0);
        self.selection_noise = self.selection_noise.max(0.0);
        Ok(self)
    }
}
