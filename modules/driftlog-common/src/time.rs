//! Timestamp parsing and the display formats used by reports.
//!
//! Timestamps travel as strings. Anything that does not parse is treated as
//! absent rather than as an error, so a single bad record never hides the
//! rest of a report.

use chrono::{DateTime, SecondsFormat, Utc};

/// Parse an RFC 3339 (or RFC 2822) timestamp into epoch milliseconds.
pub fn parse_millis(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|t| t.timestamp_millis())
        .ok()
}

/// Client timestamps are written with millisecond precision and a `Z` suffix.
pub fn to_wire_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `HH:MM:SS.mmm` in UTC, or `-` when the instant is unknown.
pub fn fmt_time(ms: Option<i64>) -> String {
    match ms.and_then(DateTime::<Utc>::from_timestamp_millis) {
        Some(t) => t.format("%H:%M:%S%.3f").to_string(),
        None => "-".to_string(),
    }
}

pub fn fmt_span(ms: Option<i64>) -> String {
    match ms {
        Some(ms) => format!("{ms}ms"),
        None => "-".to_string(),
    }
}

pub fn fmt_offset(ms: i64) -> String {
    let sign = if ms >= 0 { '+' } else { '-' };
    format!("{sign}{}ms", ms.unsigned_abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_rfc3339_with_fraction() {
        assert_eq!(parse_millis("1970-01-01T00:00:01.500Z"), Some(1500));
    }

    #[test]
    fn parses_offsets() {
        assert_eq!(parse_millis("1970-01-01T02:00:00+02:00"), Some(0));
    }

    #[test]
    fn garbage_is_absent() {
        assert_eq!(parse_millis("not a time"), None);
        assert_eq!(parse_millis(""), None);
    }

    #[test]
    fn wire_time_round_trips_to_millis() {
        let t = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let wire = to_wire_time(t);
        assert!(wire.ends_with('Z'));
        assert_eq!(parse_millis(&wire), Some(1_700_000_000_123));
    }

    #[test]
    fn formats_time_of_day() {
        assert_eq!(fmt_time(Some(3_723_004)), "01:02:03.004");
        assert_eq!(fmt_time(None), "-");
    }

    #[test]
    fn formats_spans_and_offsets() {
        assert_eq!(fmt_span(Some(42)), "42ms");
        assert_eq!(fmt_span(None), "-");
        assert_eq!(fmt_offset(12), "+12ms");
        assert_eq!(fmt_offset(0), "+0ms");
        assert_eq!(fmt_offset(-7), "-7ms");
    }
}
