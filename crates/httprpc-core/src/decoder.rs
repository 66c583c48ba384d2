//! Response decoding: status, content type and body into a result.
//!
//! - 2xx with a payload decodes to `Some(value)`; an explicit `null` payload
//!   is `Some(Value::Null)`.
//! - 2xx with an empty (or whitespace-only) body is the absent result, `None`.
//! - Anything else is a [`RpcError::Protocol`] carrying the status and, when
//!   the body offers one, a human-readable description.
//! - A 2xx body that does not parse is a [`RpcError::Decode`].

use crate::config::TransportConfig;
use crate::error::{Result, RpcError};
use crate::value::Value;
use reqwest::StatusCode;

/// Keys searched, in order, for a description in a JSON error body.
const DESCRIPTION_KEYS: [&str; 4] = ["message", "error", "description", "detail"];

/// Map a completed HTTP exchange to the invocation outcome.
pub fn decode_response(
    status: StatusCode,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<Option<Value>> {
    if !status.is_success() {
        return Err(RpcError::Protocol {
            status: status.as_u16(),
            message: error_description(status, content_type, body),
        });
    }

    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let text = decode_text(content_type, body)?;
    let payload = text.trim_start_matches('\u{feff}');
    if payload.trim().is_empty() {
        return Ok(None);
    }

    let value = serde_json::from_str::<Value>(payload)?;
    Ok(Some(value))
}

/// Extract the `charset` parameter of a content type, lowercased.
pub fn charset(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        if value.is_empty() {
            None
        } else {
            Some(value.to_ascii_lowercase())
        }
    })
}

/// Decode a body to text using the declared charset (UTF-8 by default).
fn decode_text(content_type: Option<&str>, body: &[u8]) -> Result<String> {
    let charset = content_type.and_then(charset);

    match charset.as_deref() {
        None | Some("utf-8") | Some("utf8") => {
            String::from_utf8(body.to_vec()).map_err(|e| RpcError::Decode {
                message: format!("Response body is not valid UTF-8: {}", e),
                source: None,
            })
        }
        Some("iso-8859-1") | Some("latin1") | Some("us-ascii") | Some("ascii") => {
            Ok(body.iter().map(|&b| b as char).collect())
        }
        Some(other) => Err(RpcError::Decode {
            message: format!("Unsupported response charset: {}", other),
            source: None,
        }),
    }
}

/// Find a human-readable description in an error response.
fn error_description(status: StatusCode, content_type: Option<&str>, body: &[u8]) -> Option<String> {
    let reason = status.canonical_reason().map(str::to_string);
    let text = String::from_utf8_lossy(body);
    let text = text.trim();

    if text.is_empty() {
        return reason;
    }

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        let described = match &value {
            Value::Text(s) => Some(s.clone()),
            Value::Mapping(map) => DESCRIPTION_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(|v| v.as_str().ok()))
                .map(str::to_string),
            _ => None,
        };
        return described.filter(|s| !s.trim().is_empty()).or(reason);
    }

    let is_html = content_type
        .map(|ct| ct.to_ascii_lowercase().contains("html"))
        .unwrap_or(false)
        || text.starts_with('<');
    if is_html {
        return reason;
    }

    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| {
            line.chars()
                .take(TransportConfig::ERROR_DESCRIPTION_MAX_LEN)
                .collect()
        })
        .or(reason)
}
