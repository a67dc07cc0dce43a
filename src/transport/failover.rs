//! Ordered transport failover.
//!
//! Tries each transport in turn and moves on only for network-level
//! failures. A cancellation, or any HTTP response at all, ends the walk.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::resilience::abort::CancellationToken;
use crate::resilience::signatures::is_cancellation;
use crate::transport::{RawResponse, Transport, TransportBinding, TransportError, TransportRequest};

/// Primary transport plus fallbacks.
#[derive(Clone)]
pub struct FailoverTransport {
    transports: Vec<Arc<dyn Transport>>,
}

impl FailoverTransport {
    pub fn new(primary: Arc<dyn Transport>, fallbacks: Vec<Arc<dyn Transport>>) -> Self {
        let mut transports = Vec::with_capacity(fallbacks.len() + 1);
        transports.push(primary);
        transports.extend(fallbacks);
        Self { transports }
    }

    pub fn len(&self) -> usize {
        self.transports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }
}

impl Transport for FailoverTransport {
    fn binding(&self) -> TransportBinding {
        self.transports[0].binding()
    }

    fn send(
        &self,
        request: TransportRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<RawResponse, TransportError>> {
        let transports = self.transports.clone();
        Box::pin(async move {
            let mut last_error = None;
            for (i, transport) in transports.iter().enumerate() {
                if let Some(reason) = cancel.reason() {
                    return Err(TransportError::new(
                        transport.binding(),
                        "aborted",
                        format!("failover stopped: {reason:?}"),
                    ));
                }
                match transport.send(request.clone(), cancel.clone()).await {
                    Ok(response) => return Ok(response),
                    Err(e) if is_cancellation(&e) => return Err(e),
                    Err(e) => {
                        tracing::warn!(
                            transport_idx = i,
                            binding = %e.binding,
                            error = %e,
                            "Transport failed, trying next"
                        );
                        last_error = Some(e);
                    }
                }
            }
            Err(last_error.unwrap_or_else(|| {
                TransportError::new(TransportBinding::Reqwest, "config", "no transports configured")
            }))
        })
    }
}
