//! Payload parsing and HTTP status classification.
//!
//! Nothing here panics or propagates a raw `serde_json` error: every
//! failure is mapped onto the error taxonomy.

use serde_json::Value;

use crate::http::response::GuardedResponse;
use crate::types::{ApiResult, ErrorInfo, ErrorKind};

/// Longest payload excerpt quoted in a `MalformedPayload` message.
pub const SNIPPET_LIMIT: usize = 120;

/// Parse response text as JSON.
pub fn parse(text: &str) -> Result<Value, ErrorInfo> {
    if text.trim().is_empty() {
        return Err(ErrorInfo::new(ErrorKind::EmptyBody, "response body is empty"));
    }
    serde_json::from_str(text).map_err(|_| {
        ErrorInfo::new(
            ErrorKind::MalformedPayload,
            format!("malformed JSON payload: {}", snippet(text)),
        )
    })
}

/// Map a non-2xx status to an error, preferring the server's own message.
///
/// Returns `None` for 2xx.
pub fn classify_http(status: u16, parsed_body: Option<&Value>) -> Option<ErrorInfo> {
    if is_success(status) {
        return None;
    }
    let message = parsed_body
        .and_then(server_message)
        .unwrap_or_else(|| format!("HTTP {status}"));
    Some(ErrorInfo::http(status, message))
}

/// `body.error ?? body.message`, accepting `{"error": {"message": ..}}` too.
pub fn server_message(body: &Value) -> Option<String> {
    let error = body.get("error").and_then(|e| match e {
        Value::String(s) => Some(s.as_str()),
        Value::Object(_) => e.get("message").and_then(Value::as_str),
        _ => None,
    });
    error
        .or_else(|| body.get("message").and_then(Value::as_str))
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Read a guarded response once and turn it into a result.
///
/// For non-2xx responses the status always wins: an empty or unparseable
/// body still yields `HttpStatus`.
pub async fn interpret(response: &GuardedResponse) -> ApiResult<Value> {
    let status = response.status();
    let text = match response.text().await {
        Ok(text) => text,
        Err(error) => return ApiResult::failure(error, status),
    };

    if !is_success(status) {
        let parsed = parse(&text).ok();
        let error = classify_http(status, parsed.as_ref())
            .unwrap_or_else(|| ErrorInfo::http(status, format!("HTTP {status}")));
        return ApiResult::failure(error, status);
    }

    match parse(&text) {
        Ok(value) => ApiResult::success(value, status),
        Err(error) => ApiResult::failure(error, status),
    }
}

fn snippet(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(SNIPPET_LIMIT) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
