//! Payload preparation: recognition-service reply → [`RawExtraction`].
//!
//! Model replies are noisy in a few predictable ways. The reply text may be
//! wrapped in a ```` ```json ```` fence or carry a BOM and zero-width
//! characters. The decoded object may carry an `"error"` key (the service
//! gave up) or a `"_usage"` side channel (token accounting) that must not
//! reach the canonicalizer.

use crate::error::InvoiceError;
use crate::model::RawExtraction;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

/// Key carrying token/cost accounting from the recognition service.
pub const USAGE_KEY: &str = "_usage";

/// Key signalling that the recognition service failed.
pub const ERROR_KEY: &str = "error";

/// A decoded payload, ready for canonicalization.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedPayload {
    pub raw: RawExtraction,
    /// The stripped `_usage` value, untouched.
    pub usage: Option<Value>,
}

/// Parse reply text (possibly fenced) into a prepared payload.
pub fn parse_extraction_text(text: &str) -> Result<PreparedPayload, InvoiceError> {
    let cleaned = remove_invisible_chars(text);
    let body = strip_code_fences(&cleaned);
    let value: Value =
        serde_json::from_str(body.trim()).map_err(|e| InvoiceError::MalformedPayload {
            detail: format!("not valid JSON: {e}"),
        })?;
    prepare_payload(value)
}

/// Check the top-level shape, surface upstream errors and strip `_usage`.
pub fn prepare_payload(value: Value) -> Result<PreparedPayload, InvoiceError> {
    let mut raw = match value {
        Value::Object(map) => map,
        other => {
            return Err(InvoiceError::MalformedPayload {
                detail: format!("expected a JSON object, got {}", json_kind(&other)),
            })
        }
    };

    if let Some(err) = raw.get(ERROR_KEY) {
        let message = match err {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(InvoiceError::ExtractionFailed { message });
    }

    let usage = raw.remove(USAGE_KEY);
    debug!(
        keys = raw.len(),
        has_usage = usage.is_some(),
        "prepared extraction payload"
    );
    Ok(PreparedPayload { raw, usage })
}

static RE_CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> &str {
    match RE_CODE_FENCE.captures(input) {
        Some(caps) => caps.get(1).map_or(input, |m| m.as_str()),
        None => input,
    }
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{FEFF}', '\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
