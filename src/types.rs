//! Shared result and error taxonomy.
//!
//! Every public entry point of the coordinator returns an [`ApiResult`];
//! nothing else crosses that boundary.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of every failure the coordinator can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Explicit cancellation or superseded by a newer operation.
    Aborted,
    /// Deadline exceeded.
    Timeout,
    /// Transport-level failure before any response arrived.
    Network,
    /// Non-2xx response; carries status and server message.
    HttpStatus,
    /// 2xx response without a payload.
    EmptyBody,
    /// Payload is not valid JSON (or not the expected shape).
    MalformedPayload,
    /// Response body accessed outside the consumption guard.
    AlreadyConsumed,
    /// Catch-all.
    Unknown,
}

impl ErrorKind {
    /// Stable label used for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Aborted => "aborted",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Network => "network",
            ErrorKind::HttpStatus => "http_status",
            ErrorKind::EmptyBody => "empty_body",
            ErrorKind::MalformedPayload => "malformed_payload",
            ErrorKind::AlreadyConsumed => "already_consumed",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Aborted and timed-out operations were superseded, not failed.
    pub fn is_expected(self) -> bool {
        matches!(self, ErrorKind::Aborted | ErrorKind::Timeout)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error details carried by a failed [`ApiResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            http_status: None,
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::HttpStatus,
            message: message.into(),
            http_status: Some(status),
        }
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Aborted, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// See [`ErrorKind::is_expected`].
    pub fn is_expected(&self) -> bool {
        self.kind.is_expected()
    }

    /// Text suitable for showing to an end user.
    ///
    /// Server-supplied messages are shown verbatim; otherwise a generic
    /// phrase for the kind is used.
    pub fn user_message(&self) -> String {
        if !self.message.trim().is_empty() {
            return self.message.clone();
        }
        match self.kind {
            ErrorKind::Aborted => "The request was cancelled.".to_string(),
            ErrorKind::Timeout => "The request timed out. Please try again.".to_string(),
            ErrorKind::Network => "Unable to reach the server.".to_string(),
            ErrorKind::HttpStatus => match self.http_status {
                Some(status) => format!("HTTP {status}"),
                None => "The server rejected the request.".to_string(),
            },
            ErrorKind::EmptyBody => "The server returned an empty response.".to_string(),
            ErrorKind::MalformedPayload => "The server returned an invalid response.".to_string(),
            ErrorKind::AlreadyConsumed | ErrorKind::Unknown => {
                "An unexpected error occurred.".to_string()
            }
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.http_status {
            Some(status) => write!(f, "{} ({}): {}", self.kind, status, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

/// Immutable outcome of a coordinated call.
///
/// `status` is the HTTP status when a response was received and `0`
/// otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub status: u16,
}

impl<T> ApiResult<T> {
    pub fn success(data: T, status: u16) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            status,
        }
    }

    pub fn failure(error: ErrorInfo, status: u16) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            status,
        }
    }

    /// Kind of the carried error, if any.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Transform the success payload, keeping status and error untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResult<U> {
        ApiResult {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
            status: self.status,
        }
    }

    /// Fallible transform of the success payload.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Result<U, ErrorInfo>) -> ApiResult<U> {
        let status = self.status;
        match (self.data, self.error) {
            (Some(data), None) => match f(data) {
                Ok(mapped) => ApiResult::success(mapped, status),
                Err(error) => ApiResult::failure(error, status),
            },
            (_, Some(error)) => ApiResult::failure(error, status),
            (None, None) => {
                ApiResult::failure(ErrorInfo::unknown("result carried no data"), status)
            }
        }
    }
}

/// Logical operation key used by the Abort Coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId(pub String);

impl OperationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OperationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for OperationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
