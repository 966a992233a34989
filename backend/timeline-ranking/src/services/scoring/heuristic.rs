// ============================================
// Heuristic Scorer (portable scoring path)
// ============================================
//
// score = engagement × time_decay × quality × virality × diversity × media
//       × seen × author × content × recency × discussion × trust
//       × novelty × random_multiplier + random_offset
//
// Every engagement-dependent factor is non-decreasing in each engagement
// count. Ratio rewards use saturating min(count, k · likes) terms and the
// virality tiers are continuous, so adding a like, repost, reply or quote
// never lowers a score.

use super::{ScoreBackend, ScoringInput};
use crate::utils::exponential_decay;

/// Hard age cutoff in hours
const MAX_AGE_HOURS: f64 = 72.0;
const FRESH_POST_HOURS: f64 = 12.0;
/// Posts past the cutoff need at least this much engagement to score at all
const MIN_ENGAGEMENT_PAST_CUTOFF: u64 = 5;

/// Engagement floor so fresh zero-engagement posts still order by penalties
const BASELINE_ENGAGEMENT: f64 = 0.5;

const AUTHOR_PENALTY_STEP: f64 = 0.45;
const AUTHOR_PENALTY_FLOOR: f64 = 0.38;
const CONTENT_PENALTY_STEP: f64 = 0.6;
const CONTENT_PENALTY_FLOOR: f64 = 0.60;

const NEVER_SEEN_NOVELTY_BONUS: f64 = 0.12;

/// Log weights of each engagement type
#[derive(Debug, Clone)]
pub struct HeuristicWeights {
    pub like: f64,
    pub repost: f64,
    pub reply: f64,
    pub quote: f64,
}

impl Default for HeuristicWeights {
    fn default() -> Self {
        Self {
            like: 2.0,
            repost: 3.0,
            reply: 1.5,
            quote: 2.5,
        }
    }
}

/// Portable implementation of the scoring function
#[derive(Debug, Clone, Default)]
pub struct HeuristicBackend {
    weights: HeuristicWeights,
}

impl HeuristicBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom engagement weights
    pub fn with_weights(weights: HeuristicWeights) -> Self {
        Self { weights }
    }

    pub fn compute(&self, input: &ScoringInput) -> f64 {
        let age_hours = input.age_hours();

        if age_hours > MAX_AGE_HOURS && input.total_engagement() < MIN_ENGAGEMENT_PAST_CUTOFF {
            return 0.0;
        }

        let likes = input.like_count as f64;
        let reposts = input.repost_count as f64;
        let replies = input.reply_count as f64;
        let quotes = input.quote_count as f64;

        let engagement = BASELINE_ENGAGEMENT
            + (likes + 1.0).ln() * self.weights.like
            + (reposts + 1.0).ln() * self.weights.repost
            + (replies + 1.0).ln() * self.weights.reply
            + (quotes + 1.0).ln() * self.weights.quote;

        let product = engagement
            * time_decay(age_hours)
            * quality_multiplier(likes, reposts, replies, quotes)
            * virality_multiplier(likes, reposts, age_hours)
            * diversity_bonus(input)
            * media_multiplier(input)
            * seen_penalty(input.hours_since_seen)
            * author_penalty(input.author_repeats)
            * content_penalty(input.content_repeats)
            * recency_adjust(age_hours)
            * discussion_boost(likes, replies)
            * trust_multiplier(input)
            * novelty_multiplier(input.novelty_factor, input.hours_since_seen);

        let (random_multiplier, random_offset) = random_terms(input.random_factor, input.all_seen);

        let score = product * random_multiplier + random_offset;
        if score.is_finite() {
            score.max(0.0)
        } else {
            0.0
        }
    }
}

impl ScoreBackend for HeuristicBackend {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn is_native(&self) -> bool {
        false
    }

    fn score(&self, input: &ScoringInput) -> f64 {
        self.compute(input)
    }
}

/// Fresh posts are boosted up to 1.8×, falling to 0.7 at 24h, 0.2 at the
/// cutoff, then decaying exponentially.
fn time_decay(age_hours: f64) -> f64 {
    if age_hours < FRESH_POST_HOURS {
        1.0 + ((FRESH_POST_HOURS - age_hours) / FRESH_POST_HOURS) * 0.8
    } else if age_hours < 24.0 {
        1.0 - ((age_hours - FRESH_POST_HOURS) / (24.0 - FRESH_POST_HOURS)) * 0.3
    } else if age_hours < MAX_AGE_HOURS {
        0.7 - ((age_hours - 24.0) / (MAX_AGE_HOURS - 24.0)) * 0.5
    } else {
        0.2 * exponential_decay(age_hours - MAX_AGE_HOURS, 24.0)
    }
}

fn saturate(x: f64, half: f64) -> f64 {
    x / (x + half)
}

/// Reward for `count` keeping pace with likes at the given ratio
fn pace_bonus(count: f64, likes: f64, ratio: f64, bonus: f64) -> f64 {
    let paced = count.min(ratio * likes.max(1.0));
    1.0 + bonus * saturate(paced, 2.0)
}

/// Reposts, replies and quotes relative to likes: discourages like farming
fn quality_multiplier(likes: f64, reposts: f64, replies: f64, quotes: f64) -> f64 {
    pace_bonus(reposts, likes, 0.3, 0.4)
        * pace_bonus(replies, likes, 0.2, 0.3)
        * pace_bonus(quotes, likes, 0.1, 0.2)
}

/// Tiered boost on weighted actions (20 / 50 / 100) plus a velocity kicker
fn virality_multiplier(likes: f64, reposts: f64, age_hours: f64) -> f64 {
    let actions = likes + reposts * 2.0;
    let velocity = actions / age_hours.max(0.1);

    let mut boost = if actions >= 100.0 {
        1.5 + (actions / 100.0).ln() * 0.3
    } else if actions >= 50.0 {
        1.3 + ((actions - 50.0) / 50.0) * 0.2
    } else if actions >= 20.0 {
        1.0 + ((actions - 20.0) / 30.0) * 0.3
    } else {
        1.0
    };

    if velocity > 10.0 {
        boost *= 1.0 + (velocity / 10.0 + 1.0).ln() * 0.2;
    }
    boost
}

/// +15% per distinct engagement type beyond the first
fn diversity_bonus(input: &ScoringInput) -> f64 {
    let types = [
        input.like_count,
        input.repost_count,
        input.reply_count,
        input.quote_count,
    ]
    .iter()
    .filter(|count| **count > 0)
    .count() as f64;
    1.0 + (types - 1.0) * 0.15
}

fn media_multiplier(input: &ScoringInput) -> f64 {
    if !input.has_media {
        return 1.0;
    }
    if input.quote_count > 0 {
        1.15 * 1.1
    } else {
        1.15
    }
}

/// Steep penalty for posts the viewer saw moments ago, relaxing to 0.96
pub(crate) fn seen_penalty(hours_since_seen: f64) -> f64 {
    if !hours_since_seen.is_finite() || hours_since_seen < 0.0 {
        return 1.0;
    }
    match hours_since_seen {
        h if h < 0.5 => 0.14,
        h if h < 2.0 => 0.22,
        h if h < 6.0 => 0.34,
        h if h < 12.0 => 0.48,
        h if h < 24.0 => 0.65,
        h if h < 48.0 => 0.8,
        h if h < 96.0 => 0.9,
        _ => 0.96,
    }
}

fn author_penalty(repeats: u32) -> f64 {
    (1.0 / (1.0 + repeats as f64 * AUTHOR_PENALTY_STEP)).max(AUTHOR_PENALTY_FLOOR)
}

fn content_penalty(repeats: u32) -> f64 {
    (1.0 / (1.0 + repeats as f64 * CONTENT_PENALTY_STEP)).max(CONTENT_PENALTY_FLOOR)
}

fn recency_adjust(age_hours: f64) -> f64 {
    if age_hours < 0.5 {
        1.12
    } else if age_hours < 3.0 {
        1.06
    } else if age_hours > MAX_AGE_HOURS {
        0.7
    } else if age_hours > 48.0 {
        0.82
    } else {
        1.0
    }
}

/// Up to +35% when replies keep pace with half the likes
fn discussion_boost(likes: f64, replies: f64) -> f64 {
    let paced = replies.min(likes * 0.5);
    1.0 + 0.35 * saturate(paced, 1.0)
}

/// Account trust and content hygiene adjustments from the extended features
fn trust_multiplier(input: &ScoringInput) -> f64 {
    let mut multiplier = 1.0;

    if input.verified {
        multiplier *= 1.08;
    }
    if input.gold {
        multiplier *= 1.12;
    }
    multiplier *= 1.0 + ((input.follower_count as f64 + 1.0).log10() * 0.02).min(0.12);

    if input.has_community_note {
        multiplier *= 0.7;
    }
    if input.super_poster_boost.is_finite() {
        multiplier *= 1.0 + input.super_poster_boost.clamp(0.0, 3.0);
    }

    let reports = input.blocked_by_count as f64 * 0.02 + input.muted_by_count as f64 * 0.01;
    multiplier *= (1.0 / (1.0 + reports)).max(0.5);

    multiplier *= 1.0 - 0.7 * finite_unit(input.spam_score);

    multiplier *= match input.account_age_days {
        d if d < 1.0 => 0.8,
        d if d < 7.0 => 0.92,
        _ => 1.0,
    };

    multiplier *= 0.6_f64.powi(input.suspicious_url_count.min(3) as i32);
    if input.url_count > 3 {
        multiplier *= 0.85;
    }
    if input.hashtag_count > 5 {
        multiplier *= 0.8;
    }
    if input.mention_count > 5 {
        multiplier *= 0.8;
    }

    let emoji = finite_unit(input.emoji_density);
    if emoji > 0.4 {
        multiplier *= 1.0 - (emoji - 0.4) * 0.5;
    }

    let spam_keywords = finite_unit(input.spam_keyword_score);
    multiplier *= 1.0 - 0.6 * spam_keywords;

    // copy-paste campaigns pushing links or bait
    if input.cluster_size >= 3 && (input.suspicious_url_count > 0 || spam_keywords > 0.0) {
        multiplier *= 0.5;
    }

    if input.engagement_velocity.is_finite() {
        multiplier *= 1.0 + 0.03 * input.engagement_velocity.clamp(0.0, 10.0);
    }
    if input.is_video {
        multiplier *= 1.08;
    }

    multiplier
}

fn finite_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn novelty_multiplier(novelty_factor: f64, hours_since_seen: f64) -> f64 {
    let mut novelty = if novelty_factor.is_finite() && novelty_factor > 0.0 {
        novelty_factor
    } else {
        1.0
    };
    if hours_since_seen < 0.0 {
        novelty += NEVER_SEEN_NOVELTY_BONUS;
    }
    novelty.clamp(0.75, 1.5)
}

/// (multiplier, additive offset). Wider jitter once the whole batch was seen.
fn random_terms(random_factor: f64, all_seen: bool) -> (f64, f64) {
    let bounded = finite_unit(random_factor);
    let (offset, span) = if all_seen { (0.25, 0.55) } else { (0.04, 0.1) };
    let component = offset + bounded * span;
    (1.0 + component * 0.08, component)
}
