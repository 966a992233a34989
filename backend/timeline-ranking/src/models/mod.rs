use serde::de::{DeserializeOwned, Deserializer, Error as _};
use serde::ser::{Error as _, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};

/// Legacy key names accepted for a field, canonical name first
type KeyAliases = &'static [(&'static str, &'static [&'static str])];

const POST_KEY_ALIASES: KeyAliases = &[
    ("repost_count", &["retweet_count"]),
    ("quoted_post", &["quoted_tweet"]),
];
const AUTHOR_KEY_ALIASES: KeyAliases = &[];
const ATTACHMENT_KEY_ALIASES: KeyAliases = &[
    ("type", &["file_type", "mime_type"]),
    ("url", &["file_url"]),
    ("name", &["file_name"]),
];

/// A timeline post as handed over by the timeline assembly layer.
///
/// Every field is read leniently: missing, null or mistyped values fall back
/// to their defaults so that one malformed record never fails a whole batch.
/// Fields this crate does not know about are kept in `extra`. A record read
/// from JSON is written back with exactly the keys it arrived with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct Post {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: String,

    #[serde(default, deserialize_with = "lenient")]
    pub created_at: Option<RawTimestamp>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub content: String,

    #[serde(default, deserialize_with = "lenient_count")]
    pub like_count: u64,

    #[serde(default, alias = "retweet_count", deserialize_with = "lenient_count")]
    pub repost_count: u64,

    #[serde(default, deserialize_with = "lenient_count")]
    pub reply_count: u64,

    #[serde(default, deserialize_with = "lenient_count")]
    pub quote_count: u64,

    #[serde(default, deserialize_with = "lenient_count")]
    pub view_count: u64,

    #[serde(default, deserialize_with = "lenient")]
    pub attachments: Vec<Attachment>,

    #[serde(default, deserialize_with = "lenient")]
    pub author: Option<Author>,

    #[serde(default, deserialize_with = "lenient_bool")]
    pub super_post: bool,

    #[serde(default, deserialize_with = "lenient")]
    pub super_post_boost: Option<f64>,

    #[serde(default, deserialize_with = "lenient")]
    pub fact_check: Option<Value>,

    #[serde(default, deserialize_with = "lenient_bool")]
    pub has_community_note: bool,

    #[serde(
        default,
        alias = "quoted_tweet",
        deserialize_with = "lenient"
    )]
    pub quoted_post: Option<Box<Post>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,

    /// Keys present when the record was read; `None` for records built in code
    #[serde(skip)]
    pub received_keys: Option<BTreeSet<String>>,
}

/// Embedded author summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct Author {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub username: String,

    #[serde(default, deserialize_with = "lenient_bool")]
    pub verified: bool,

    #[serde(default, deserialize_with = "lenient_bool")]
    pub gold: bool,

    #[serde(default, deserialize_with = "lenient_count")]
    pub follower_count: u64,

    #[serde(default, deserialize_with = "lenient")]
    pub created_at: Option<RawTimestamp>,

    #[serde(default, deserialize_with = "lenient_ratio")]
    pub spam_score: f64,

    #[serde(default, deserialize_with = "lenient_count")]
    pub blocked_by_count: u64,

    #[serde(default, deserialize_with = "lenient_count")]
    pub muted_by_count: u64,

    #[serde(default, deserialize_with = "lenient")]
    pub super_poster_boost: Option<f64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,

    /// Keys present when the record was read; `None` for records built in code
    #[serde(skip)]
    pub received_keys: Option<BTreeSet<String>>,
}

/// Media descriptor attached to a post
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct Attachment {
    /// MIME-like type, e.g. `video/mp4` or `image`
    #[serde(
        default,
        rename = "type",
        alias = "file_type",
        alias = "mime_type",
        deserialize_with = "lenient_string"
    )]
    pub media_type: String,

    #[serde(default, alias = "file_url", deserialize_with = "lenient")]
    pub url: Option<String>,

    #[serde(default, alias = "file_name", deserialize_with = "lenient")]
    pub name: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,

    /// Keys present when the record was read; `None` for records built in code
    #[serde(skip)]
    pub received_keys: Option<BTreeSet<String>>,
}

/// Serde impls for a record type: reading remembers the incoming key set,
/// writing emits only those keys, under the names the sender used.
macro_rules! impl_received_shape {
    ($ty:ident, $aliases:expr) => {
        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let fields = Map::<String, Value>::deserialize(deserializer)?;
                let received: BTreeSet<String> = fields.keys().cloned().collect();
                let mut record =
                    $ty::deserialize(Value::Object(fields)).map_err(D::Error::custom)?;
                record.received_keys = Some(received);
                Ok(record)
            }
        }

        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                let full = $ty::serialize(self, serde_json::value::Serializer)
                    .map_err(S::Error::custom)?;
                match &self.received_keys {
                    Some(received) => {
                        restore_received_keys(full, received, $aliases).serialize(serializer)
                    }
                    None => full.serialize(serializer),
                }
            }
        }
    };
}

impl_received_shape!(Post, POST_KEY_ALIASES);
impl_received_shape!(Author, AUTHOR_KEY_ALIASES);
impl_received_shape!(Attachment, ATTACHMENT_KEY_ALIASES);

/// Drop keys the record did not arrive with and rename canonical keys back
/// to the alias that was received
fn restore_received_keys(
    serialized: Value,
    received: &BTreeSet<String>,
    aliases: KeyAliases,
) -> Value {
    let Value::Object(fields) = serialized else {
        return serialized;
    };

    let restored = fields
        .into_iter()
        .filter_map(|(key, value)| {
            if received.contains(&key) {
                return Some((key, value));
            }
            aliases
                .iter()
                .find(|(canonical, _)| *canonical == key)
                .and_then(|(_, names)| names.iter().find(|name| received.contains(**name)))
                .map(|name| (name.to_string(), value))
        })
        .collect();

    Value::Object(restored)
}

/// Timestamp exactly as it arrived: unix seconds/milliseconds or a date string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<i64> for RawTimestamp {
    fn from(value: i64) -> Self {
        RawTimestamp::Integer(value)
    }
}

impl From<&str> for RawTimestamp {
    fn from(value: &str) -> Self {
        RawTimestamp::Text(value.to_string())
    }
}

impl From<chrono::DateTime<chrono::Utc>> for RawTimestamp {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        RawTimestamp::Text(value.to_rfc3339())
    }
}

/// When the viewer last saw each post.
///
/// A present key with `None` means "seen at an unknown time": it counts as
/// seen for the all-seen flag but carries no recency information.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeenMap {
    entries: HashMap<String, Option<RawTimestamp>>,
}

impl SeenMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a plain set of seen ids with no timestamps
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: ids.into_iter().map(|id| (id.into(), None)).collect(),
        }
    }

    pub fn insert(&mut self, post_id: impl Into<String>, seen_at: Option<RawTimestamp>) {
        self.entries.insert(post_id.into(), seen_at);
    }

    pub fn contains(&self, post_id: &str) -> bool {
        self.entries.contains_key(post_id)
    }

    /// Outer `None`: never seen. `Some(None)`: seen, time unknown.
    pub fn get(&self, post_id: &str) -> Option<Option<&RawTimestamp>> {
        self.entries.get(post_id).map(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, Option<RawTimestamp>)> for SeenMap {
    fn from_iter<T: IntoIterator<Item = (S, Option<RawTimestamp>)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().map(|(id, ts)| (id.into(), ts)).collect(),
        }
    }
}

/// Read a batch out of arbitrary JSON. Anything but an array is an empty batch;
/// array elements that are not objects are skipped.
pub fn posts_from_json(value: &Value) -> Vec<Post> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter(|item| item.is_object())
            .filter_map(|item| <Post as Deserialize>::deserialize(item).ok())
            .collect(),
        _ => Vec::new(),
    }
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn lenient_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        _ => String::new(),
    })
}

fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let number = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(match number {
        Some(n) if n.is_finite() && n > 0.0 => n.floor() as u64,
        _ => 0,
    })
}

fn lenient_ratio<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let number = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(number
        .filter(|n| n.is_finite())
        .map(|n| n.clamp(0.0, 1.0))
        .unwrap_or(0.0))
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_post_from_sqlite_row() {
        let post: Post = serde_json::from_value(json!({
            "id": "p1",
            "created_at": "2026-10-18 09:30:00",
            "content": "hello #rust",
            "like_count": 12,
            "retweet_count": "3",
            "reply_count": null,
            "quoted_tweet": { "id": "q1", "attachments": [{ "file_type": "image/png" }] },
            "author": { "id": 7, "username": "ferris", "verified": 1, "spam_score": 0.2 },
            "liked_by_user": true
        }))
        .unwrap();

        assert_eq!(post.id, "p1");
        assert_eq!(post.like_count, 12);
        assert_eq!(post.repost_count, 3);
        assert_eq!(post.reply_count, 0);
        let author = post.author.as_ref().unwrap();
        assert_eq!(author.id, "7");
        assert!(author.verified);
        assert_eq!(
            post.quoted_post.as_ref().unwrap().attachments[0].media_type,
            "image/png"
        );
        assert_eq!(post.extra.get("liked_by_user"), Some(&json!(true)));
    }

    #[test]
    fn test_malformed_fields_fall_back_to_defaults() {
        let post: Post = serde_json::from_value(json!({
            "id": "p2",
            "created_at": { "not": "a timestamp" },
            "like_count": -5,
            "quote_count": "many",
            "attachments": "none",
            "author": "deleted",
            "has_community_note": "1"
        }))
        .unwrap();

        assert_eq!(post.like_count, 0);
        assert_eq!(post.quote_count, 0);
        assert!(post.attachments.is_empty());
        assert!(post.author.is_none());
        assert!(post.has_community_note);
    }

    #[test]
    fn test_unknown_fields_round_trip() {
        let input = json!({
            "id": "p3",
            "content": "x",
            "poll": { "options": [1, 2] },
            "author": { "id": "u1", "avatar": "a.png" }
        });
        let post: Post = serde_json::from_value(input).unwrap();
        let output = serde_json::to_value(&post).unwrap();

        assert_eq!(output["poll"], json!({ "options": [1, 2] }));
        assert_eq!(output["author"]["avatar"], json!("a.png"));
    }

    fn keys(value: &Value) -> BTreeSet<String> {
        value.as_object().unwrap().keys().cloned().collect()
    }

    #[test]
    fn test_serialized_keys_match_received_keys() {
        let input = json!({
            "id": "p4",
            "content": "legacy row",
            "like_count": 9,
            "retweet_count": 2,
            "author": { "id": "u2" },
            "attachments": [{ "file_type": "video/mp4", "file_url": "https://cdn/v.mp4" }]
        });
        let post: Post = serde_json::from_value(input.clone()).unwrap();
        let output = serde_json::to_value(&post).unwrap();

        assert_eq!(post.repost_count, 2);
        assert_eq!(keys(&output), keys(&input));
        assert_eq!(output["retweet_count"], json!(2));
        assert_eq!(keys(&output["author"]), keys(&input["author"]));
        assert_eq!(
            keys(&output["attachments"][0]),
            keys(&input["attachments"][0])
        );
    }

    #[test]
    fn test_record_built_in_code_serializes_every_field() {
        let post = Post {
            id: "p5".to_string(),
            repost_count: 1,
            ..Default::default()
        };
        let output = serde_json::to_value(&post).unwrap();

        assert_eq!(output["repost_count"], json!(1));
        assert_eq!(output["like_count"], json!(0));
        assert!(output.get("received_keys").is_none());
    }

    #[test]
    fn test_posts_from_json_non_array_is_empty() {
        assert!(posts_from_json(&json!({ "id": "p1" })).is_empty());
        assert!(posts_from_json(&json!(null)).is_empty());

        let posts = posts_from_json(&json!([{ "id": "a" }, 42, { "id": "b" }]));
        assert_eq!(posts.len(), 2);
    }

    #[test]
    fn test_seen_map_from_ids() {
        let seen = SeenMap::from_ids(["a", "b"]);

        assert!(seen.contains("a"));
        assert_eq!(seen.get("a"), Some(None));
        assert_eq!(seen.get("z"), None);
        assert_eq!(seen.len(), 2);
    }
}
