//! Programmable in-memory transport.
//!
//! Used by tests and by callers that want to stub the backend. Every call
//! is counted and recorded; a call still pending when its token is
//! cancelled fails with a `cancelled` error.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;

use crate::resilience::abort::CancellationToken;
use crate::transport::{RawResponse, Transport, TransportBinding, TransportError, TransportRequest};

type Handler =
    Arc<dyn Fn(TransportRequest) -> BoxFuture<'static, Result<RawResponse, TransportError>> + Send + Sync>;

pub struct ScriptedTransport {
    handler: Handler,
    calls: AtomicUsize,
    requests: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(TransportRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<RawResponse, TransportError>> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |request: TransportRequest| -> BoxFuture<'static, _> {
                Box::pin(handler(request))
            }),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `status` and `body`.
    pub fn respond(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        Self::new(move |_| {
            let body = body.clone();
            async move { Ok::<_, TransportError>(RawResponse::from_text(status, body)) }
        })
    }

    /// Never answer; only cancellation ends the call.
    pub fn hanging() -> Self {
        Self::new(|_| std::future::pending())
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests seen so far, in order.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Transport for ScriptedTransport {
    fn binding(&self) -> TransportBinding {
        TransportBinding::Scripted
    }

    fn send(
        &self,
        request: TransportRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<RawResponse, TransportError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());

        let call = (self.handler)(request);
        Box::pin(async move {
            tokio::select! {
                result = call => result,
                reason = cancel.cancelled() => Err(TransportError::new(
                    TransportBinding::Scripted,
                    "cancelled",
                    format!("cancelled by caller ({reason:?})"),
                )),
            }
        })
    }
}

impl std::fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedTransport")
            .field("calls", &self.call_count())
            .finish()
    }
}
