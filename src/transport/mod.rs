//! Transport subsystem.
//!
//! # Data Flow
//! ```text
//! Coordinator
//!     → Transport::send(TransportRequest, token)
//!         → reqwest_transport.rs (production HTTP client)
//!         → failover.rs (ordered list of transports)
//!         → scripted.rs (in-memory, programmable)
//!     ← RawResponse { status, one-shot body }
//! ```
//!
//! # Design Decisions
//! - Transports are interchangeable behind one trait; nothing outside the
//!   coordinator calls them directly
//! - The response body is one-shot by type: reading it consumes it
//! - Dropping the send future is the abort signal; the token is passed along
//!   for transports that can observe it

pub mod failover;
pub mod reqwest_transport;
pub mod scripted;

use std::fmt;

use futures_util::future::BoxFuture;
use reqwest::Method;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::resilience::abort::CancellationToken;

pub use failover::FailoverTransport;
pub use reqwest_transport::ReqwestTransport;
pub use scripted::ScriptedTransport;

/// Identifies which transport produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportBinding {
    Reqwest,
    Scripted,
}

impl fmt::Display for TransportBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportBinding::Reqwest => f.write_str("reqwest"),
            TransportBinding::Scripted => f.write_str("scripted"),
        }
    }
}

/// Failure reported by a transport before or while reading a response.
#[derive(Debug, Clone, Error)]
#[error("{binding} transport error ({name}): {message}")]
pub struct TransportError {
    pub binding: TransportBinding,
    /// Short error class, e.g. "connect", "timeout", "body".
    pub name: String,
    pub message: String,
    pub status: Option<u16>,
}

impl TransportError {
    pub fn new(binding: TransportBinding, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            binding,
            name: name.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// Outgoing request handed to a transport.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    /// Serialized JSON body.
    pub body: Option<String>,
    pub request_id: Uuid,
}

impl TransportRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
            request_id: Uuid::new_v4(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// One-shot response payload. Reading it consumes it.
pub trait ResponseBody: Send {
    fn read_text(self: Box<Self>) -> BoxFuture<'static, Result<String, TransportError>>;
}

/// In-memory body.
#[derive(Debug, Clone)]
pub struct TextBody(pub String);

impl ResponseBody for TextBody {
    fn read_text(self: Box<Self>) -> BoxFuture<'static, Result<String, TransportError>> {
        Box::pin(async move { Ok::<_, TransportError>(self.0) })
    }
}

/// Response as delivered by a transport, body not yet read.
pub struct RawResponse {
    pub status: u16,
    pub body: Box<dyn ResponseBody>,
}

impl RawResponse {
    pub fn new(status: u16, body: Box<dyn ResponseBody>) -> Self {
        Self { status, body }
    }

    pub fn from_text(status: u16, text: impl Into<String>) -> Self {
        Self::new(status, Box::new(TextBody(text.into())))
    }
}

impl fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// A way of issuing HTTP calls.
pub trait Transport: Send + Sync + 'static {
    fn binding(&self) -> TransportBinding;

    fn send(
        &self,
        request: TransportRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<RawResponse, TransportError>>;
}
