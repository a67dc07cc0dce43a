//! Outgoing API request description.
//!
//! # Responsibilities
//! - Describe a call independently of any transport
//! - Resolve relative paths against the configured base URL
//! - Carry per-call overrides (deadline, operation id, headers)

use std::time::Duration;

use reqwest::Method;
use serde_json::Value;
use url::Url;

use crate::types::OperationId;

/// A call issued through `Coordinator::generic_request`.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Absolute URL, or a path resolved against the API base URL.
    pub path: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    /// Overrides the configured request deadline.
    pub timeout: Option<Duration>,
    /// Overrides the operation id derived from the fingerprint.
    pub operation_id: Option<OperationId>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
            timeout: None,
            operation_id: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_operation_id(mut self, id: impl Into<OperationId>) -> Self {
        self.operation_id = Some(id.into());
        self
    }
}

/// Resolve `path` against `base`; absolute URLs are used as-is.
pub fn resolve_url(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    match Url::parse(path) {
        Ok(absolute) => Ok(absolute),
        Err(url::ParseError::RelativeUrlWithoutBase) => base.join(path),
        Err(e) => Err(e),
    }
}
