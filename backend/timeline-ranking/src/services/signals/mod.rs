/// Signal Extraction
///
/// Turns one post plus batch-wide aggregates into the `ScoringInput` feature
/// vector consumed by the scoring backends.
///
/// Author and content repeat counts are relative to the current batch, never
/// global: the same post can carry different penalties in different calls.
pub mod text;

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::models::{Post, SeenMap};
use crate::services::scoring::ScoringInput;
use crate::utils::{hours_between, parse_timestamp};

pub use text::{normalize_content, UrlMetrics};

/// Sentinel for "never seen" (or seen at an unknown time)
pub const NEVER_SEEN: f64 = -1.0;

const NOVELTY_UNSEEN: f64 = 1.2;
const NOVELTY_STALE: f64 = 1.05;
const STALE_SEEN_HOURS: f64 = 72.0;

/// Post-level boost used when a post is flagged as super post without a value
const DEFAULT_SUPER_POST_BOOST: f64 = 0.5;

const MAX_ENGAGEMENT_VELOCITY: f64 = 10.0;
const MIN_VELOCITY_AGE_HOURS: f64 = 0.1;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "webm", "mkv", "avi", "ogv", "3gp"];

/// Batch-wide aggregates, computed once per ranking call
#[derive(Debug, Clone)]
pub struct BatchAggregates {
    pub author_counts: HashMap<String, usize>,
    pub content_counts: HashMap<String, usize>,
    /// True only when every post in the batch has a seen entry
    pub all_seen: bool,
    /// Reference instant for every age computed in this call
    pub now: DateTime<Utc>,
}

impl BatchAggregates {
    pub fn from_batch(posts: &[Post], seen: &SeenMap, now: DateTime<Utc>) -> Self {
        let mut author_counts: HashMap<String, usize> = HashMap::new();
        let mut content_counts: HashMap<String, usize> = HashMap::new();

        for post in posts {
            if let Some(key) = author_key(post) {
                *author_counts.entry(key.to_string()).or_insert(0) += 1;
            }
            let content_key = normalize_content(&post.content);
            if !content_key.is_empty() {
                *content_counts.entry(content_key).or_insert(0) += 1;
            }
        }

        let all_seen = !posts.is_empty() && posts.iter().all(|post| seen.contains(&post.id));

        Self {
            author_counts,
            content_counts,
            all_seen,
            now,
        }
    }

    /// Other posts by the same author competing in this batch
    pub fn author_repeats(&self, post: &Post) -> u32 {
        author_key(post)
            .and_then(|key| self.author_counts.get(key))
            .map(|count| count.saturating_sub(1) as u32)
            .unwrap_or(0)
    }

    /// Size of the duplicate-content cluster this post belongs to (0 for empty content)
    pub fn content_cluster_size(&self, content_key: &str) -> u32 {
        if content_key.is_empty() {
            return 0;
        }
        self.content_counts.get(content_key).copied().unwrap_or(0) as u32
    }
}

/// Author identity used for repeat counting: id first, then username
pub fn author_key(post: &Post) -> Option<&str> {
    let author = post.author.as_ref()?;
    [author.id.as_str(), author.username.as_str()]
        .into_iter()
        .map(str::trim)
        .find(|key| !key.is_empty())
}

/// Hours since the viewer last saw this post, or `NEVER_SEEN`
pub fn hours_since_seen(post_id: &str, seen: &SeenMap, now: DateTime<Utc>) -> f64 {
    seen.get(post_id)
        .flatten()
        .and_then(parse_timestamp)
        .map(|seen_at| hours_between(seen_at, now).max(0.0))
        .unwrap_or(NEVER_SEEN)
}

pub fn novelty_factor(hours_since_seen: f64) -> f64 {
    let novelty = if hours_since_seen < 0.0 {
        NOVELTY_UNSEEN
    } else if hours_since_seen > STALE_SEEN_HOURS {
        NOVELTY_STALE
    } else {
        1.0
    };
    novelty.clamp(0.75, 1.5)
}

pub fn has_media(post: &Post) -> bool {
    !post.attachments.is_empty()
        || post
            .quoted_post
            .as_ref()
            .is_some_and(|quoted| !quoted.attachments.is_empty())
}

pub fn is_video(post: &Post) -> bool {
    post.attachments.iter().any(|attachment| {
        let media_type = attachment.media_type.trim().to_ascii_lowercase();
        if media_type.starts_with("video") {
            return true;
        }
        [attachment.name.as_deref(), attachment.url.as_deref()]
            .into_iter()
            .flatten()
            .any(has_video_extension)
    })
}

fn has_video_extension(path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    path.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

/// Reposts per like; without likes a small function of reposts alone. Capped at 1.0.
pub fn repost_like_ratio(like_count: u64, repost_count: u64) -> f64 {
    let ratio = if like_count > 0 {
        repost_count as f64 / (like_count as f64 + 1.0)
    } else {
        repost_count as f64 * 0.1
    };
    ratio.min(1.0)
}

/// Likes, reposts and replies per hour of age, capped at 10
pub fn engagement_velocity(post: &Post, age_hours: f64) -> f64 {
    let actions = post.like_count as f64 + post.repost_count as f64 + post.reply_count as f64;
    (actions / age_hours.max(MIN_VELOCITY_AGE_HOURS)).min(MAX_ENGAGEMENT_VELOCITY)
}

fn super_boost(post: &Post) -> f64 {
    let author_boost = post
        .author
        .as_ref()
        .and_then(|author| author.super_poster_boost)
        .unwrap_or(0.0);
    let post_boost = match post.super_post_boost {
        Some(boost) => boost,
        None if post.super_post => DEFAULT_SUPER_POST_BOOST,
        None => 0.0,
    };
    [author_boost, post_boost]
        .into_iter()
        .filter(|boost| boost.is_finite())
        .fold(0.0, f64::max)
}

/// Extract the full feature vector for one post.
///
/// Never fails: missing or malformed fields contribute neutral defaults.
pub fn extract_features(
    post: &Post,
    seen: &SeenMap,
    aggregates: &BatchAggregates,
    random_draw: f64,
) -> ScoringInput {
    let now = aggregates.now;
    let created_at = post
        .created_at
        .as_ref()
        .and_then(parse_timestamp)
        .unwrap_or(now);
    let age_hours = hours_between(created_at, now);

    let content_key = normalize_content(&post.content);
    let cluster_size = aggregates.content_cluster_size(&content_key);
    let hours_since_seen = hours_since_seen(&post.id, seen, now);
    let urls = text::url_metrics(&post.content);

    let author = post.author.as_ref();
    let account_age_days = author
        .and_then(|author| author.created_at.as_ref())
        .and_then(parse_timestamp)
        .map(|created| hours_between(created, now) / 24.0)
        .unwrap_or(0.0)
        .max(0.0);

    ScoringInput {
        created_at: created_at.timestamp(),
        now: now.timestamp(),
        like_count: post.like_count,
        repost_count: post.repost_count,
        reply_count: post.reply_count,
        quote_count: post.quote_count,
        has_media: has_media(post),
        hours_since_seen,
        author_repeats: aggregates.author_repeats(post),
        content_repeats: cluster_size.saturating_sub(1),
        novelty_factor: novelty_factor(hours_since_seen),
        random_factor: random_draw,
        all_seen: aggregates.all_seen,
        verified: author.is_some_and(|a| a.verified),
        gold: author.is_some_and(|a| a.gold),
        follower_count: author.map(|a| a.follower_count).unwrap_or(0),
        has_community_note: post.has_community_note
            || post.fact_check.as_ref().is_some_and(|note| !note.is_null()),
        super_poster_boost: super_boost(post),
        blocked_by_count: author.map(|a| a.blocked_by_count).unwrap_or(0),
        muted_by_count: author.map(|a| a.muted_by_count).unwrap_or(0),
        spam_score: author.map(|a| a.spam_score).unwrap_or(0.0),
        account_age_days,
        url_count: urls.url_count,
        suspicious_url_count: urls.suspicious_url_count,
        hashtag_count: text::hashtag_count(&post.content),
        mention_count: text::mention_count(&post.content),
        emoji_density: text::emoji_density(&post.content),
        cluster_size,
        spam_keyword_score: text::spam_keyword_score(&post.content),
        repost_like_ratio: repost_like_ratio(post.like_count, post.repost_count),
        engagement_velocity: engagement_velocity(post, age_hours),
        is_video: is_video(post),
    }
}
