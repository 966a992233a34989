// Time helpers shared by signal extraction and scoring

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::models::RawTimestamp;

/// Numeric timestamps at or above this are taken as milliseconds
const MILLIS_THRESHOLD: f64 = 1e12;

const SQLITE_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse a raw timestamp into a UTC instant.
///
/// Strings without a zone designator are read as UTC.
pub fn parse_timestamp(raw: &RawTimestamp) -> Option<DateTime<Utc>> {
    match raw {
        RawTimestamp::Integer(value) => from_epoch(*value as f64),
        RawTimestamp::Float(value) => from_epoch(*value),
        RawTimestamp::Text(text) => parse_text(text.trim()),
    }
}

fn from_epoch(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    let millis = if value.abs() >= MILLIS_THRESHOLD {
        value
    } else {
        value * 1000.0
    };
    DateTime::from_timestamp_millis(millis as i64)
}

fn parse_text(text: &str) -> Option<DateTime<Utc>> {
    if text.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Some(naive) = SQLITE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
    {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
    }
    text.parse::<f64>().ok().and_then(from_epoch)
}

/// Hours elapsed from `earlier` to `now`; negative when `earlier` is in the future.
pub fn hours_between(earlier: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - earlier).num_milliseconds() as f64 / 3_600_000.0
}

/// Exponential decay with the given e-folding time in hours
pub fn exponential_decay(age_hours: f64, scale_hours: f64) -> f64 {
    (-age_hours / scale_hours).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_epoch_seconds_and_millis() {
        let seconds = parse_timestamp(&RawTimestamp::Integer(1_760_000_000)).unwrap();
        let millis = parse_timestamp(&RawTimestamp::Integer(1_760_000_000_000)).unwrap();
        assert_eq!(seconds, millis);
        assert_eq!(seconds.timestamp(), 1_760_000_000);
    }

    #[test]
    fn test_parse_sqlite_string_as_utc() {
        let parsed = parse_timestamp(&RawTimestamp::from("2026-10-18 12:00:00")).unwrap();
        let zoned = parse_timestamp(&RawTimestamp::from("2026-10-18T12:00:00Z")).unwrap();
        assert_eq!(parsed, zoned);
    }

    #[test]
    fn test_parse_offset_string() {
        let parsed = parse_timestamp(&RawTimestamp::from("2026-10-18T14:00:00+02:00")).unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-10-18T12:00:00+00:00");
    }

    #[test]
    fn test_unparseable_inputs() {
        assert!(parse_timestamp(&RawTimestamp::from("yesterday")).is_none());
        assert!(parse_timestamp(&RawTimestamp::from("")).is_none());
        assert!(parse_timestamp(&RawTimestamp::Float(f64::NAN)).is_none());
    }

    #[test]
    fn test_hours_between() {
        let now = Utc::now();
        let earlier = now - chrono::Duration::minutes(90);
        assert!((hours_between(earlier, now) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_exponential_decay() {
        assert!((exponential_decay(0.0, 24.0) - 1.0).abs() < 1e-12);
        assert!((exponential_decay(24.0, 24.0) - (-1.0f64).exp()).abs() < 1e-12);
    }
}
