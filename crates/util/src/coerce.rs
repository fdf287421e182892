//! # Lenient Value Coercion
//!
//! Model properties arrive as loosely typed JSON: numbers written as strings,
//! booleans written as `1`, dates in several layouts. These helpers turn such
//! values into the scalar a consumer asked for, returning `None` when the
//! value cannot be read that way. The `*_or` variants fall back to a
//! caller-supplied default instead.
//!
//! Accepted date layouts are RFC 3339, `YYYY-MM-DD HH:MM:SS`,
//! `YYYY-MM-DDTHH:MM:SS`, and `YYYY-MM-DD`. Integers are read as Unix seconds.
//! Naive timestamps are taken as UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

const NAIVE_DATE_TIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"];

/// Reads a boolean.
///
/// Numbers are true when they equal one. Strings are true for `"true"`
/// (any case) or `"1"`; any other string is false. Null yields `None`.
pub fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Null => None,
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => number.as_f64().map(|number| number.round() as i64 == 1),
        Value::String(text) => {
            let text = text.trim();
            Some(text.eq_ignore_ascii_case("true") || text == "1")
        }
        Value::Array(_) | Value::Object(_) => Some(false),
    }
}

/// Reads a 64-bit integer. Fractional numbers are rounded.
pub fn parse_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|number| number.is_finite() && number.abs() < i64::MAX as f64)
                .map(|number| number.round() as i64)
        }),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Reads a 32-bit integer. Out-of-range values yield `None`.
pub fn parse_i32(value: &Value) -> Option<i32> {
    parse_i64(value).and_then(|number| i32::try_from(number).ok())
}

/// Reads a floating point number.
pub fn parse_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok().filter(|number| number.is_finite()),
        _ => None,
    }
}

/// Reads a UTC timestamp.
pub fn parse_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => parse_datetime_str(text),
        Value::Number(number) => number.as_i64().and_then(|seconds| Utc.timestamp_opt(seconds, 0).single()),
        _ => None,
    }
}

/// Parses a textual timestamp in one of the accepted layouts.
pub fn parse_datetime_str(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in NAIVE_DATE_TIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|parsed| parsed.and_utc())
}

pub fn parse_bool_or(value: &Value, fallback: bool) -> bool {
    parse_bool(value).unwrap_or(fallback)
}

pub fn parse_i32_or(value: &Value, fallback: i32) -> i32 {
    parse_i32(value).unwrap_or(fallback)
}

pub fn parse_i64_or(value: &Value, fallback: i64) -> i64 {
    parse_i64(value).unwrap_or(fallback)
}

pub fn parse_f64_or(value: &Value, fallback: f64) -> f64 {
    parse_f64(value).unwrap_or(fallback)
}

pub fn parse_datetime_or(value: &Value, fallback: DateTime<Utc>) -> DateTime<Utc> {
    parse_datetime(value).unwrap_or(fallback)
}

/// True for null, the empty string, and empty lists or maps.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Renders a value as plain text.
///
/// Strings are returned without quotes, null becomes `"null"`, and lists or
/// maps are rendered as compact JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use serde_json::json;

    #[test]
    fn test_parse_bool_accepts_numbers_and_strings() {
        assert_eq!(parse_bool(&json!(1)), Some(true));
        assert_eq!(parse_bool(&json!(0)), Some(false));
        assert_eq!(parse_bool(&json!("TRUE")), Some(true));
        assert_eq!(parse_bool(&json!("1")), Some(true));
        assert_eq!(parse_bool(&json!("yes")), Some(false));
        assert_eq!(parse_bool(&json!(null)), None);
        assert!(parse_bool_or(&json!(null), true));
    }

    #[test]
    fn test_parse_numbers_leniently() {
        assert_eq!(parse_i32(&json!(" 42 ")), Some(42));
        assert_eq!(parse_i32(&json!(2.6)), Some(3));
        assert_eq!(parse_i32(&json!(10_000_000_000_i64)), None);
        assert_eq!(parse_i64(&json!(10_000_000_000_i64)), Some(10_000_000_000));
        assert_eq!(parse_f64(&json!("3.5")), Some(3.5));
        assert_eq!(parse_f64(&json!("abc")), None);
        assert_eq!(parse_i64_or(&json!("abc"), 7), 7);
    }

    #[test]
    fn test_parse_datetime_layouts() {
        let rfc = parse_datetime(&json!("2024-03-01T10:00:00+02:00")).expect("rfc3339");
        assert_eq!(rfc.to_rfc3339(), "2024-03-01T08:00:00+00:00");

        let spaced = parse_datetime(&json!("2024-03-01 10:00:00")).expect("naive");
        assert_eq!(spaced.day(), 1);

        let date_only = parse_datetime(&json!("2024-03-01")).expect("date");
        assert_eq!(date_only.to_rfc3339(), "2024-03-01T00:00:00+00:00");

        let epoch = parse_datetime(&json!(0)).expect("epoch");
        assert_eq!(epoch.year(), 1970);

        assert!(parse_datetime(&json!("next tuesday")).is_none());
    }

    #[test]
    fn test_is_empty_and_stringify() {
        assert!(is_empty(&json!(null)));
        assert!(is_empty(&json!("")));
        assert!(is_empty(&json!([])));
        assert!(is_empty(&json!({})));
        assert!(!is_empty(&json!(0)));
        assert!(!is_empty(&json!(" ")));

        assert_eq!(stringify(&json!("a")), "a");
        assert_eq!(stringify(&json!(null)), "null");
        assert_eq!(stringify(&json!(1.5)), "1.5");
        assert_eq!(stringify(&json!({"a": 1})), r#"{"a":1}"#);
    }
}
