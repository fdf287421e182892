use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{
    Client, Method,
    header::{HeaderName, HeaderValue},
};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::{coerce::stringify, redact_sensitive};

/// Errors raised while building or sending an outbound request.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid header '{0}'")]
    InvalidHeader(String),
    #[error("unsupported http method '{0}'")]
    InvalidMethod(String),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// A fully resolved outbound call.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl OutboundRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }
}

/// Parses a method name case-insensitively.
pub fn parse_method(name: &str) -> Result<Method, HttpError> {
    match name.trim().to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "PATCH" => Ok(Method::PATCH),
        "DELETE" => Ok(Method::DELETE),
        other => Err(HttpError::InvalidMethod(other.to_string())),
    }
}

/// Joins `base` and `path` and appends `query` as query parameters.
///
/// Null query values are skipped and list values repeat the key once per
/// element.
pub fn build_url(base: &str, path: Option<&str>, query: &Map<String, Value>) -> Result<Url, HttpError> {
    let joined = match path.map(str::trim).filter(|path| !path.is_empty()) {
        Some(path) => format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/')),
        None => base.to_string(),
    };
    let mut url = Url::parse(&joined).map_err(|source| HttpError::InvalidUrl { url: joined.clone(), source })?;
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            match value {
                Value::Null => {}
                Value::Array(items) => {
                    for item in items.iter().filter(|item| !item.is_null()) {
                        pairs.append_pair(key, &stringify(item));
                    }
                }
                other => {
                    pairs.append_pair(key, &stringify(other));
                }
            }
        }
    }
    Ok(url)
}

/// Replaces `{name}` placeholders in `template` with percent-encoded values.
///
/// Placeholders without a matching parameter are left untouched.
pub fn fill_path(template: &str, parameters: &Map<String, Value>) -> String {
    let mut path = template.to_string();
    for (key, value) in parameters {
        let encoded = utf8_percent_encode(&stringify(value), NON_ALPHANUMERIC).to_string();
        path = path.replace(&format!("{{{}}}", key), &encoded);
    }
    path
}

/// Sends `request` and decodes the response body.
///
/// # Errors
///
/// Returns [`HttpError::Status`] for any status outside the 2xx range, and
/// transport or header errors as their respective variants.
pub async fn execute_request(client: Client, request: OutboundRequest) -> Result<Value, HttpError> {
    let mut builder = client.request(request.method.clone(), request.url.clone());
    for (name, value) in &request.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| HttpError::InvalidHeader(name.clone()))?;
        let header_value = HeaderValue::from_str(value).map_err(|_| HttpError::InvalidHeader(name.clone()))?;
        builder = builder.header(header_name, header_value);
    }
    if let Some(body) = &request.body {
        builder = builder.json(body);
    }

    debug!(
        method = %request.method,
        url = %request.url,
        headers = %redact_sensitive(&format_headers(&request.headers)),
        "sending outbound request"
    );
    let response = builder.send().await?;
    let status = response.status();
    let bytes = response.bytes().await?;

    if !status.is_success() {
        let body = String::from_utf8_lossy(&bytes).chars().take(512).collect::<String>();
        warn!(status = status.as_u16(), url = %request.url, "outbound request returned a non-success status");
        return Err(HttpError::Status {
            status: status.as_u16(),
            body: redact_sensitive(&body),
        });
    }
    Ok(decode_body(&bytes))
}

/// Decodes a response body.
///
/// Text shaped like a JSON object or list is parsed; other text is returned
/// as a string. Bodies that are not UTF-8 come back as a list of byte values
/// and an empty body is null.
pub fn decode_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    let Ok(text) = std::str::from_utf8(bytes) else {
        return Value::Array(bytes.iter().map(|byte| Value::from(*byte)).collect());
    };
    let trimmed = text.trim();
    let looks_structured =
        (trimmed.starts_with('{') && trimmed.ends_with('}')) || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    if looks_structured {
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => return value,
            Err(error) => debug!(%error, "response looked like JSON but failed to parse; returning text"),
        }
    }
    Value::String(text.to_string())
}

fn format_headers(headers: &[(String, String)]) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("{name}: {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_url_joins_path_and_query() {
        let query = json!({"page": 2, "tag": ["a", "b"], "skip": null});
        let url = build_url("https://api.example.com/v1/", Some("/posts"), query.as_object().expect("object")).expect("url");
        assert_eq!(url.as_str(), "https://api.example.com/v1/posts?page=2&tag=a&tag=b");
    }

    #[test]
    fn test_build_url_rejects_relative_base() {
        let error = build_url("not a url", None, &Map::new()).expect_err("invalid");
        assert!(matches!(error, HttpError::InvalidUrl { .. }));
    }

    #[test]
    fn test_fill_path_encodes_values() {
        let parameters = json!({"id": 7, "slug": "a b/c"});
        let path = fill_path("/posts/{id}/{slug}/{missing}", parameters.as_object().expect("object"));
        assert_eq!(path, "/posts/7/a%20b%2Fc/{missing}");
    }

    #[test]
    fn test_decode_body_shapes() {
        assert_eq!(decode_body(br#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(decode_body(b" [1,2] "), json!([1, 2]));
        assert_eq!(decode_body(b"plain"), json!("plain"));
        assert_eq!(decode_body(b"{broken"), json!("{broken"));
        assert_eq!(decode_body(b""), Value::Null);
        assert_eq!(decode_body(&[0xff, 0x00]), json!([255, 0]));
    }

    #[test]
    fn test_parse_method_is_case_insensitive() {
        assert_eq!(parse_method("patch").expect("method"), Method::PATCH);
        assert!(matches!(parse_method("TRACE"), Err(HttpError::InvalidMethod(_))));
    }
}
