//! Inbound request parsing.
//!
//! # Responsibilities
//! - Locate the destination under the home route
//! - Decode `{message, headers?}` into a SendRequest
//!
//! # Design Decisions
//! - Only a missing or falsy `message` (null, "", false, 0) is rejected;
//!   other scalars are sent in their textual form
//! - Header values may be strings, numbers or booleans; nulls are dropped

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::correlation::SendRequest;
use crate::http::BridgeError;

/// Path below `home_route`, or `None` if the path is outside it.
/// `home_route` must be normalized (`/` or `/segment...` without trailing `/`).
pub fn strip_home_route<'a>(path: &'a str, home_route: &str) -> Option<&'a str> {
    if home_route == "/" {
        return Some(path);
    }
    let rest = path.strip_prefix(home_route)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Build a SendRequest from the destination path and the raw JSON body.
pub fn parse_send_request(destination: &str, body: &[u8]) -> Result<SendRequest, BridgeError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(BridgeError::BadRequest("missing message".into()));
    }
    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| BridgeError::BadRequest(format!("invalid JSON body ({})", e)))?;
    let Value::Object(payload) = payload else {
        return Err(BridgeError::BadRequest("body must be a JSON object".into()));
    };

    let message = payload
        .get("message")
        .and_then(message_text)
        .ok_or_else(|| BridgeError::BadRequest("missing message".into()))?;

    let headers = match payload.get("headers") {
        None | Some(Value::Null) => HashMap::new(),
        Some(Value::Object(headers)) => header_map(headers)?,
        Some(_) => return Err(BridgeError::BadRequest("headers must be an object".into())),
    };

    SendRequest::new(destination, headers, message)
        .map_err(|_| BridgeError::BadRequest("missing destination".into()))
}

fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        other => Some(other.to_string()),
    }
}

fn header_map(headers: &Map<String, Value>) -> Result<HashMap<String, String>, BridgeError> {
    let mut out = HashMap::with_capacity(headers.len());
    for (name, value) in headers {
        let value = match value {
            Value::Null => continue,
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => {
                return Err(BridgeError::BadRequest(format!(
                    "header {:?} must be a string",
                    name
                )))
            }
        };
        out.insert(name.clone(), value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bad_request(result: Result<SendRequest, BridgeError>) -> String {
        match result {
            Err(BridgeError::BadRequest(reason)) => reason,
            other => panic!("expected bad request, got {:?}", other),
        }
    }

    #[test]
    fn home_route_root_keeps_path() {
        assert_eq!(strip_home_route("/orders", "/"), Some("/orders"));
    }

    #[test]
    fn home_route_prefix_is_segment_aware() {
        assert_eq!(strip_home_route("/api/orders", "/api"), Some("/orders"));
        assert_eq!(strip_home_route("/api", "/api"), Some(""));
        assert_eq!(strip_home_route("/apix/orders", "/api"), None);
        assert_eq!(strip_home_route("/other", "/api"), None);
    }

    #[test]
    fn message_and_headers() {
        let request = parse_send_request(
            "/queue/a/",
            br#"{"message":"hi","headers":{"priority":9,"persistent":true,"tag":"x","gone":null}}"#,
        )
        .unwrap();
        assert_eq!(request.destination(), "queue/a");
        assert_eq!(request.body(), "hi");
        assert_eq!(request.headers().get("priority").map(String::as_str), Some("9"));
        assert_eq!(request.headers().get("persistent").map(String::as_str), Some("true"));
        assert_eq!(request.headers().get("tag").map(String::as_str), Some("x"));
        assert!(!request.headers().contains_key("gone"));
    }

    #[test]
    fn headers_default_to_empty() {
        let request = parse_send_request("/orders", br#"{"message":"hi"}"#).unwrap();
        assert!(request.headers().is_empty());
    }

    #[test]
    fn scalar_messages_are_stringified() {
        let request = parse_send_request("/orders", br#"{"message":42}"#).unwrap();
        assert_eq!(request.body(), "42");
        let request = parse_send_request("/orders", br#"{"message":{"id":1}}"#).unwrap();
        assert_eq!(request.body(), r#"{"id":1}"#);
    }

    #[test]
    fn missing_or_falsy_message() {
        for body in [
            &br#"{}"#[..],
            br#"{"message":null}"#,
            br#"{"message":""}"#,
            br#"{"message":false}"#,
            br#"{"message":0}"#,
            b"",
        ] {
            assert_eq!(bad_request(parse_send_request("/orders", body)), "missing message");
        }
    }

    #[test]
    fn malformed_bodies() {
        assert!(bad_request(parse_send_request("/orders", b"{oops")).starts_with("invalid JSON body"));
        assert_eq!(
            bad_request(parse_send_request("/orders", br#"["hi"]"#)),
            "body must be a JSON object"
        );
        assert_eq!(
            bad_request(parse_send_request("/orders", br#"{"message":"hi","headers":[1]}"#)),
            "headers must be an object"
        );
        assert!(bad_request(parse_send_request(
            "/orders",
            br#"{"message":"hi","headers":{"a":{"b":1}}}"#
        ))
        .contains("must be a string"));
    }

    #[test]
    fn empty_destination() {
        assert_eq!(
            bad_request(parse_send_request("/", br#"{"message":"hi"}"#)),
            "missing destination"
        );
    }
}
