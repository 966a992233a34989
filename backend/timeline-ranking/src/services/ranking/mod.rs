/// Ranking Module
///
/// The two entry points used by timeline assembly.
///
/// # Workflow
/// 1. Aggregate the batch (author/content repeats, all-seen flag)
/// 2. Extract one `ScoringInput` per post, drawing its random factor
/// 3. Score the batch through the active `ScoreBackend`
/// 4. Sort by score and run diversified selection
///
/// Neither entry point returns an error: a missing compiled model degrades
/// to the heuristic formula, malformed posts score with neutral defaults.
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::RankingConfig;
use crate::models::{Post, SeenMap};
use crate::services::diversity::{DiversityLayer, ScoredPost};
use crate::services::scoring::{shared_backend, ScoreBackend};
use crate::services::signals::{author_key, extract_features, normalize_content, BatchAggregates};

pub struct RankingEngine {
    backend: Arc<dyn ScoreBackend>,
    diversity: DiversityLayer,
    require_native: bool,
}

impl RankingEngine {
    pub fn new(backend: Arc<dyn ScoreBackend>, config: &RankingConfig) -> Self {
        Self {
            backend,
            diversity: DiversityLayer::new(config),
            require_native: config.require_native,
        }
    }

    /// Engine on the process-wide backend
    pub fn from_config(config: &RankingConfig) -> Self {
        Self::new(shared_backend(config), config)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Whether the compiled scoring backend is in use
    pub fn is_native_available(&self) -> bool {
        self.backend.is_native()
    }

    /// Score one post against precomputed batch aggregates.
    ///
    /// Pure for a given `random_draw`: identical arguments give identical
    /// scores. Always finite and non-negative.
    pub fn compute_score(
        &self,
        post: &Post,
        seen: &SeenMap,
        aggregates: &BatchAggregates,
        random_draw: f64,
    ) -> f64 {
        let input = extract_features(post, seen, aggregates, random_draw);
        sanitize(self.backend.score(&input))
    }

    /// Score, sort and diversify a batch using the thread-local RNG.
    ///
    /// Returns every input post exactly once.
    pub fn rank_and_select(
        &self,
        posts: Vec<Post>,
        seen: &SeenMap,
        display_limit: Option<i64>,
    ) -> Vec<Post> {
        self.rank_and_select_with_rng(posts, seen, display_limit, &mut rand::thread_rng())
    }

    pub fn rank_and_select_with_rng<R: Rng + ?Sized>(
        &self,
        posts: Vec<Post>,
        seen: &SeenMap,
        display_limit: Option<i64>,
        rng: &mut R,
    ) -> Vec<Post> {
        if posts.is_empty() {
            return Vec::new();
        }

        if self.require_native && !self.backend.is_native() {
            warn!(
                backend = self.backend.name(),
                batch_size = posts.len(),
                "Compiled scoring backend unavailable, returning batch unranked"
            );
            return posts;
        }

        let batch_size = posts.len();
        let aggregates = BatchAggregates::from_batch(&posts, seen, Utc::now());

        let inputs: Vec<_> = posts
            .iter()
            .map(|post| extract_features(post, seen, &aggregates, rng.gen::<f64>()))
            .collect();
        let scores = self.backend.score_batch(&inputs);

        let mut ranked: Vec<ScoredPost> = posts
            .into_iter()
            .zip(inputs)
            .enumerate()
            .map(|(i, (post, input))| ScoredPost {
                author_key: author_key(&post).map(str::to_string),
                content_key: normalize_content(&post.content),
                hours_since_seen: input.hours_since_seen,
                score: sanitize(scores.get(i).copied().unwrap_or(0.0)),
                post,
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let limit = self.diversity.display_limit(display_limit, batch_size);
        let pool_size = self.diversity.candidate_pool_size(limit, batch_size);

        debug!(
            batch_size,
            display_limit = limit,
            pool_size,
            backend = self.backend.name(),
            all_seen = aggregates.all_seen,
            "Ranked timeline batch"
        );

        self.diversity.select(ranked, limit, rng)
    }
}

/// Clamp backend output to a finite, non-negative score
fn sanitize(score: f64) -> f64 {
    if score.is_finite() {
        score.max(0.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Author;
    use crate::services::scoring::{MockScoreBackend, ScoringInput};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn quiet_config() -> RankingConfig {
        RankingConfig {
            jitter_swap_probability: 0.0,
            selection_noise: 0.0,
            ..Default::default()
        }
    }

    fn post(id: &str, author: &str, likes: u64) -> Post {
        Post {
            id: id.to_string(),
            content: format!("post {}", id),
            like_count: likes,
            author: Some(Author {
                id: author.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn like_scoring_backend(native: bool) -> MockScoreBackend {
        let mut backend = MockScoreBackend::new();
        backend.expect_name().return_const("mock");
        backend.expect_is_native().return_const(native);
        backend
            .expect_score_batch()
            .returning(|inputs: &[ScoringInput]| {
                inputs.iter().map(|input| input.like_count as f64).collect()
            });
        backend
    }

    fn ids(posts: &[Post]) -> Vec<&str> {
        posts.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn test_rank_by_backend_score() {
        let engine = RankingEngine::new(Arc::new(like_scoring_backend(false)), &quiet_config());
        let posts = vec![
            post("low", "a", 1),
            post("high", "b", 50),
            post("mid", "c", 10),
        ];
        let mut rng = StdRng::seed_from_u64(11);

        let ranked = engine.rank_and_select_with_rng(posts, &SeenMap::new(), None, &mut rng);

        assert_eq!(ids(&ranked), vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_strict_mode_returns_input_unranked() {
        let mut backend = MockScoreBackend::new();
        backend.expect_name().return_const("mock");
        backend.expect_is_native().return_const(false);
        backend.expect_score_batch().times(0);

        let config = RankingConfig {
            require_native: true,
            ..quiet_config()
        };
        let engine = RankingEngine::new(Arc::new(backend), &config);
        let posts = vec![post("1", "a", 1), post("2", "b", 99), post("3", "c", 5)];

        let result = engine.rank_and_select(posts.clone(), &SeenMap::new(), Some(2));

        assert_eq!(result, posts);
    }

    #[test]
    fn test_strict_mode_with_native_backend_ranks() {
        let config = RankingConfig {
            require_native: true,
            ..quiet_config()
        };
        let engine = RankingEngine::new(Arc::new(like_scoring_backend(true)), &config);
        let mut rng = StdRng::seed_from_u64(2);

        let result = engine.rank_and_select_with_rng(
            vec![post("1", "a", 1), post("2", "b", 99)],
            &SeenMap::new(),
            None,
            &mut rng,
        );

        assert!(engine.is_native_available());
        assert_eq!(ids(&result), vec!["2", "1"]);
    }

    #[test]
    fn test_empty_batch_skips_backend() {
        let mut backend = MockScoreBackend::new();
        backend.expect_score_batch().times(0);
        let engine = RankingEngine::new(Arc::new(backend), &quiet_config());

        assert!(engine
            .rank_and_select(Vec::new(), &SeenMap::new(), Some(5))
            .is_empty());
    }

    #[test]
    fn test_short_or_invalid_backend_output_is_sanitized() {
        let mut backend = MockScoreBackend::new();
        backend.expect_name().return_const("mock");
        backend.expect_is_native().return_const(false);
        backend
            .expect_score_batch()
            .returning(|_| vec![f64::NAN, -4.0]);
        let engine = RankingEngine::new(Arc::new(backend), &quiet_config());
        let posts = vec![post("1", "a", 0), post("2", "b", 0), post("3", "c", 0)];
        let mut rng = StdRng::seed_from_u64(4);

        let result = engine.rank_and_select_with_rng(posts, &SeenMap::new(), None, &mut rng);

        let mut returned = ids(&result);
        returned.sort();
        assert_eq!(returned, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_compute_score_uses_backend_and_clamps() {
        let mut backend = MockScoreBackend::new();
        backend
            .expect_score()
            .withf(|input: &ScoringInput| input.random_factor == 0.25)
            .returning(|input: &ScoringInput| input.like_count as f64 - 10.0);
        let engine = RankingEngine::new(Arc::new(backend), &quiet_config());

        let posts = vec![post("1", "a", 4), post("2", "b", 30)];
        let seen = SeenMap::new();
        let aggregates = BatchAggregates::from_batch(&posts, &seen, Utc::now());

        assert_eq!(engine.compute_score(&posts[0], &seen, &aggregates, 0.25), 0.0);
        assert_eq!(engine.compute_score(&posts[1], &seen, &aggregates, 0.25), 20.0);
    }

    #[test]
    fn test_backend_name() {
        let engine = RankingEngine::new(Arc::new(like_scoring_backend(false)), &quiet_config());
        assert_eq!(engine.backend_name(), "mock");
        assert!(!engine.is_native_available());
    }
}
