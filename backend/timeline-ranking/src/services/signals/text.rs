// ============================================
// Text Signals
// ============================================
//
// Content-derived spam and quality indicators:
// - URLs and suspicious (shortener / tracker) hosts
// - Hashtag and mention stuffing
// - Emoji density
// - Known spam phrases
// - Normalized content fingerprint for duplicate detection

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)https?://\S+").expect("valid regex")
});
static HASHTAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^\w#])#\w+").expect("valid regex")
});
static MENTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^\w@])@\w+").expect("valid regex")
});
static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Link shorteners and IP-logging hosts commonly used to hide spam targets.
/// A host matches when it equals an entry or is a subdomain of one.
pub const SUSPICIOUS_DOMAINS: &[&str] = &[
    "bit.ly",
    "tinyurl.com",
    "goo.gl",
    "ow.ly",
    "is.gd",
    "buff.ly",
    "cutt.ly",
    "rebrand.ly",
    "shorturl.at",
    "rb.gy",
    "tiny.cc",
    "adf.ly",
    "bl.ink",
    "t.ly",
    "grabify.link",
    "iplogger.org",
    "2no.co",
];

/// Lower-case phrases typical of engagement bait and scams
pub const SPAM_PHRASES: &[&str] = &[
    "click here",
    "free money",
    "buy now",
    "limited time offer",
    "act now",
    "dm me for",
    "work from home",
    "make money fast",
    "100% free",
    "risk free",
    "guaranteed income",
    "double your",
    "crypto giveaway",
    "airdrop",
    "follow for follow",
    "f4f",
    "check my bio",
    "link in bio",
    "promo code",
    "earn $",
];

/// Weight of each distinct spam phrase hit
const SPAM_PHRASE_WEIGHT: f64 = 0.15;

/// Lower bound of the emoji density denominator, so short posts are not
/// flagged for a single emoji
const EMOJI_DENSITY_MIN_CHARS: usize = 15;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UrlMetrics {
    pub url_count: u32,
    pub suspicious_url_count: u32,
}

/// Lower-cased content with URLs stripped and whitespace collapsed.
/// Near-identical copies of one message share this fingerprint.
pub fn normalize_content(content: &str) -> String {
    let lowered = content.to_lowercase();
    let without_urls = URL_RE.replace_all(&lowered, "");
    WHITESPACE_RE
        .replace_all(&without_urls, " ")
        .trim()
        .to_string()
}

pub fn url_metrics(content: &str) -> UrlMetrics {
    let mut metrics = UrlMetrics::default();

    for found in URL_RE.find_iter(content) {
        metrics.url_count += 1;
        let host = Url::parse(found.as_str())
            .ok()
            .and_then(|url| url.host_str().map(str::to_ascii_lowercase));
        if host.as_deref().is_some_and(is_suspicious_host) {
            metrics.suspicious_url_count += 1;
        }
    }

    metrics
}

pub fn is_suspicious_host(host: &str) -> bool {
    let host = host.trim_end_matches('.');
    let host = host.strip_prefix("www.").unwrap_or(host);
    SUSPICIOUS_DOMAINS.iter().any(|domain| {
        host == *domain
            || host
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

pub fn hashtag_count(content: &str) -> u32 {
    HASHTAG_RE.find_iter(content).count() as u32
}

pub fn mention_count(content: &str) -> u32 {
    MENTION_RE.find_iter(content).count() as u32
}

/// Emoji code points per visible character, capped at 1.0
pub fn emoji_density(content: &str) -> f64 {
    let emoji = content.chars().filter(|c| is_emoji(*c)).count();
    if emoji == 0 {
        return 0.0;
    }
    let visible = content.chars().filter(|c| !c.is_whitespace()).count();
    let denominator = visible.max(EMOJI_DENSITY_MIN_CHARS) as f64;
    (emoji as f64 / denominator).min(1.0)
}

fn is_emoji(c: char) -> bool {
    matches!(
        c as u32,
        0x1F000..=0x1F02F   // mahjong / domino
            | 0x1F0A0..=0x1F0FF // playing cards
            | 0x1F1E6..=0x1F1FF // regional indicators
            | 0x1F300..=0x1F5FF // symbols & pictographs
            | 0x1F600..=0x1F64F // emoticons
            | 0x1F680..=0x1F6FF // transport & map
            | 0x1F900..=0x1F9FF // supplemental symbols
            | 0x1FA70..=0x1FAFF // symbols & pictographs ext-A
            | 0x2600..=0x26FF   // misc symbols
            | 0x2700..=0x27BF // dingbats
    )
}

/// 0.15 per distinct spam phrase found (case-insensitive), capped at 1.0
pub fn spam_keyword_score(content: &str) -> f64 {
    if content.is_empty() {
        return 0.0;
    }
    let lowered = content.to_lowercase();
    let hits = SPAM_PHRASES
        .iter()
        .filter(|phrase| lowered.contains(*phrase))
        .count();
    (hits as f64 * SPAM_PHRASE_WEIGHT).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_content() {
        assert_eq!(
            normalize_content("  Check THIS  out\n https://example.com/a?b=1  now "),
            "check this out now"
        );
        assert_eq!(normalize_content("https://only.link"), "");
        assert_eq!(
            normalize_content("Same text"),
            normalize_content("same   TEXT http://x.y")
        );
    }

    #[test]
    fn test_url_metrics() {
        let metrics = url_metrics(
            "see https://bit.ly/abc and http://news.example.org/x and https://go.tinyurl.com/z",
        );
        assert_eq!(metrics.url_count, 3);
        assert_eq!(metrics.suspicious_url_count, 2);

        assert_eq!(url_metrics("no links here"), UrlMetrics::default());
    }

    #[test]
    fn test_suspicious_host_requires_label_boundary() {
        assert!(is_suspicious_host("bit.ly"));
        assert!(is_suspicious_host("www.bit.ly"));
        assert!(is_suspicious_host("eu.rebrand.ly"));
        assert!(!is_suspicious_host("orbit.ly"));
        assert!(!is_suspicious_host("example.com"));
    }

    #[test]
    fn test_hashtags_and_mentions() {
        let content = "#rust is great, thanks @ferris and @crab! #oss#ignored email@host.com";
        assert_eq!(hashtag_count(content), 2);
        assert_eq!(mention_count(content), 2);
        assert_eq!(hashtag_count(""), 0);
    }

    #[test]
    fn test_emoji_density() {
        assert_eq!(emoji_density("plain text"), 0.0);
        // one emoji in a short post uses the 15-char floor
        assert!((emoji_density("hi 😀") - 1.0 / 15.0).abs() < 1e-9);
        assert_eq!(emoji_density("🔥🔥🔥🔥🔥🔥🔥🔥🔥🔥🔥🔥🔥🔥🔥🔥🔥🔥🔥🔥"), 1.0);
    }

    #[test]
    fn test_spam_keyword_score() {
        assert_eq!(spam_keyword_score("a normal update"), 0.0);
        let score = spam_keyword_score("CLICK HERE for FREE MONEY, click here again");
        assert!((score - 0.30).abs() < 1e-9);

        let everything = SPAM_PHRASES.join(" ");
        assert_eq!(spam_keyword_score(&everything), 1.0);
    }
}
