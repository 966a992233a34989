use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::ops::Range;

use crate::config::RankingConfig;
use crate::models::Post;

/// Strict duplicate penalty while the first slots are being filled
const EARLY_DUPLICATE_PENALTY: f64 = 0.12;
const LATE_DUPLICATE_PENALTY: f64 = 0.8;
const EARLY_SLOTS: usize = 3;

const AUTHOR_SOFT_LIMIT: usize = 2;
const AUTHOR_HARD_LIMIT: usize = 3;
const AUTHOR_SOFT_PENALTY: f64 = 0.5;
const AUTHOR_HARD_PENALTY: f64 = 0.3;

/// Post with its transient score and the keys selection compares on
#[derive(Debug, Clone)]
pub struct ScoredPost {
    pub post: Post,
    pub score: f64,
    pub author_key: Option<String>,
    /// Normalized content, empty when the post has no text
    pub content_key: String,
    /// `-1.0` when never seen
    pub hours_since_seen: f64,
}

impl ScoredPost {
    /// Same author, or the same non-empty normalized content
    fn conflicts_with(&self, other: &ScoredPost) -> bool {
        let same_author = matches!(
            (&self.author_key, &other.author_key),
            (Some(a), Some(b)) if a == b
        );
        let same_content = !self.content_key.is_empty() && self.content_key == other.content_key;
        same_author || same_content
    }
}

/// Diversity Layer - diversified top-K selection
///
/// Picks the leading slots of a scored batch greedily, penalizing repeated
/// authors, duplicated content and recently seen posts, then shuffles the
/// very top slightly so repeated calls do not show an identical feed head.
/// Everything not selected follows in score order; nothing is dropped.
pub struct DiversityLayer {
    default_display_limit: usize,
    max_display_limit: usize,
    min_candidate_pool: usize,
    candidate_pool_multiplier: usize,
    jitter_window: usize,
    jitter_swap_probability: f64,
    selection_noise: f64,
}

impl DiversityLayer {
    pub fn new(config: &RankingConfig) -> Self {
        Self {
            default_display_limit: config.default_display_limit.max(1),
            max_display_limit: config.max_display_limit.max(1),
            min_candidate_pool: config.min_candidate_pool,
            candidate_pool_multiplier: config.candidate_pool_multiplier,
            jitter_window: config.jitter_window,
            jitter_swap_probability: config.jitter_swap_probability,
            selection_noise: config.selection_noise,
        }
    }

    /// Effective number of diversified slots for a batch.
    ///
    /// Out-of-range requests are clamped, never rejected.
    pub fn display_limit(&self, requested: Option<i64>, batch_size: usize) -> usize {
        let limit = match requested {
            None => self.default_display_limit,
            Some(value) => value.clamp(1, self.max_display_limit as i64) as usize,
        };
        limit.min(batch_size)
    }

    /// Number of top-scored posts the greedy pass considers
    pub fn candidate_pool_size(&self, display_limit: usize, batch_size: usize) -> usize {
        display_limit
            .saturating_mul(self.candidate_pool_multiplier)
            .max(self.min_candidate_pool)
            .min(batch_size)
    }

    /// Reorder a batch sorted by descending score.
    ///
    /// Returns the same posts: the diversified head followed by the
    /// unselected remainder in score order.
    pub fn select<R: Rng + ?Sized>(
        &self,
        ranked: Vec<ScoredPost>,
        display_limit: usize,
        rng: &mut R,
    ) -> Vec<Post> {
        if ranked.is_empty() {
            return Vec::new();
        }

        let limit = display_limit.min(ranked.len());
        let pool_size = self.candidate_pool_size(limit, ranked.len());

        let mut candidates = ranked;
        let mut remainder = candidates.split_off(pool_size);

        let mut selected = self.greedy_fill(&mut candidates, limit, rng);

        // Pool exhausted: backfill in score order
        if selected.len() < limit {
            let missing = (limit - selected.len()).min(remainder.len());
            selected.extend(remainder.drain(..missing));
        }

        self.jitter(&mut selected, limit, rng);

        let boundary = selected.len();
        let mut ordered = selected;
        ordered.append(&mut candidates);
        ordered.append(&mut remainder);

        guard_adjacent(&mut ordered, boundary);

        ordered.into_iter().map(|scored| scored.post).collect()
    }

    /// Greedy selection: take the best penalized candidate until `limit`
    /// slots are filled or the pool runs out
    fn greedy_fill<R: Rng + ?Sized>(
        &self,
        candidates: &mut Vec<ScoredPost>,
        limit: usize,
        rng: &mut R,
    ) -> Vec<ScoredPost> {
        let mut selected: Vec<ScoredPost> = Vec::with_capacity(limit);
        let mut author_counts: HashMap<String, usize> = HashMap::new();
        let mut selected_content: HashSet<String> = HashSet::new();

        while selected.len() < limit && !candidates.is_empty() {
            let mut best_idx = 0;
            let mut best_value = f64::MIN;

            for (i, candidate) in candidates.iter().enumerate() {
                let noise = 1.0 + rng.gen::<f64>() * self.selection_noise;
                let value = candidate.score
                    * noise
                    * content_penalty(candidate, &selected_content, selected.len())
                    * author_penalty(candidate, &author_counts)
                    * seen_recency_penalty(candidate.hours_since_seen);

                if value > best_value {
                    best_value = value;
                    best_idx = i;
                }
            }

            let chosen = candidates.remove(best_idx);
            if let Some(author) = &chosen.author_key {
                *author_counts.entry(author.clone()).or_insert(0) += 1;
            }
            if !chosen.content_key.is_empty() {
                selected_content.insert(chosen.content_key.clone());
            }
            selected.push(chosen);
        }

        selected
    }

    /// Random swaps inside the leading window of the selected slots
    fn jitter<R: Rng + ?Sized>(&self, selected: &mut [ScoredPost], limit: usize, rng: &mut R) {
        let window = limit.min(self.jitter_window).min(selected.len());
        for i in 0..window.saturating_sub(1) {
            if rng.gen::<f64>() < self.jitter_swap_probability {
                let j = rng.gen_range(i + 1..window);
                selected.swap(i, j);
            }
        }
    }
}

fn content_penalty(
    candidate: &ScoredPost,
    selected_content: &HashSet<String>,
    filled: usize,
) -> f64 {
    if candidate.content_key.is_empty() || !selected_content.contains(&candidate.content_key) {
        return 1.0;
    }
    if filled < EARLY_SLOTS {
        EARLY_DUPLICATE_PENALTY
    } else {
        LATE_DUPLICATE_PENALTY
    }
}

fn author_penalty(candidate: &ScoredPost, author_counts: &HashMap<String, usize>) -> f64 {
    let count = candidate
        .author_key
        .as_ref()
        .and_then(|author| author_counts.get(author))
        .copied()
        .unwrap_or(0);

    let mut penalty = 1.0;
    if count >= AUTHOR_SOFT_LIMIT {
        penalty *= AUTHOR_SOFT_PENALTY;
    }
    if count > AUTHOR_HARD_LIMIT {
        penalty *= AUTHOR_HARD_PENALTY;
    }
    penalty
}

/// 1.0 for unseen posts, 0.85 rising to 1.0 as the last view ages to 72h
fn seen_recency_penalty(hours_since_seen: f64) -> f64 {
    if hours_since_seen.is_nan() || hours_since_seen < 0.0 {
        return 1.0;
    }
    0.85 + 0.15 * (hours_since_seen / 72.0).min(1.0)
}

/// Keep the first two slots of the final order from sharing an author or
/// content. `boundary` is the number of selected slots; the rest of
/// `ordered` is the unselected remainder.
///
/// The replacement is the first remainder item that conflicts with neither
/// slot 0 nor the displaced slot-1 post. When every remainder item shares
/// something with the displaced post, one that only avoids slot 0 is taken,
/// and failing that a later selected slot is swapped in.
fn guard_adjacent(ordered: &mut Vec<ScoredPost>, boundary: usize) {
    if ordered.len() < 2 || !ordered[0].conflicts_with(&ordered[1]) {
        return;
    }

    let top = &ordered[0];
    let displaced = &ordered[1];
    let clear_of_top = |candidate: &ScoredPost| !candidate.conflicts_with(top);
    let clear_of_both =
        |candidate: &ScoredPost| clear_of_top(candidate) && !candidate.conflicts_with(displaced);

    let remainder = boundary.max(2)..ordered.len();
    let selected = 2..boundary.min(ordered.len());
    let first_where = |mut range: Range<usize>, accept: &dyn Fn(&ScoredPost) -> bool| {
        range.find(|&i| accept(&ordered[i]))
    };

    let replacement = first_where(remainder.clone(), &clear_of_both)
        .or_else(|| first_where(remainder, &clear_of_top));
    let swap_with = first_where(selected.clone(), &clear_of_both)
        .or_else(|| first_where(selected, &clear_of_top));

    if let Some(j) = replacement {
        let replacement = ordered.remove(j);
        if boundary >= 2 {
            // displaced slot-1 post leads the remainder
            let displaced = std::mem::replace(&mut ordered[1], replacement);
            ordered.insert(boundary, displaced);
        } else {
            ordered.insert(1, replacement);
        }
        return;
    }

    if let Some(j) = swap_with {
        ordered.swap(1, j);
    }
}
