//! # Nodeflow Util
//!
//! Helpers shared by the engine and the CLI: lenient value coercion, HTTP
//! plumbing for outbound calls, async bridging for synchronous callers, and
//! small path and JSON utilities.

pub mod async_runtime;
pub mod coerce;
pub mod http;
pub mod json_merge;
pub mod path_processing;

use once_cell::sync::Lazy;
use regex::Regex;

pub use async_runtime::block_on_future;
pub use json_merge::merge_json;
pub use path_processing::expand_tilde;

static SENSITIVE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(authorization: )([\w\-\.=:/+ ]+)",
        r#"(?i)([A-Z0-9_\-]*?(KEY|TOKEN|SECRET|PASSWORD)["']?\s*[=:]\s*["']?)([^\s"',}]+)"#,
        r"(?i)(DATABASE_URL=)([^\s]+)",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Redacts values that look like secrets in a string.
///
/// Used before request headers or bodies reach the logs.
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for pattern in SENSITIVE_PATTERNS.iter() {
        redacted = pattern
            .replace_all(&redacted, |caps: &regex::Captures| {
                let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                format!("{}<redacted>", prefix)
            })
            .to_string();
    }
    redacted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_authorization_and_token_values() {
        let line = "Authorization: Bearer abc123\nAPI_TOKEN=xyz";
        let redacted = redact_sensitive(line);
        assert!(!redacted.contains("abc123"));
        assert!(!redacted.contains("xyz"));
        assert!(redacted.contains("API_TOKEN=<redacted>"));
    }

    #[test]
    fn test_redacts_json_style_secrets() {
        let redacted = redact_sensitive(r#"{"x-api-key": "s3cr3t", "accept": "json"}"#);
        assert!(!redacted.contains("s3cr3t"));
        assert!(redacted.contains("accept"));
    }
}
