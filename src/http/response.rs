//! Response consumption guard.
//!
//! # Responsibilities
//! - Own the one-shot body of a raw response
//! - Read it exactly once, as text, and memoize the result
//! - Serve every later `text()`/`json()` call from the memoized text
//!
//! # Design Decisions
//! - Flipping `consumed` and taking the body is one synchronous step under a
//!   lock, never split across an await
//! - Concurrent accessors wait on the same read instead of racing for the body
//! - Reaching for the raw body after the guard has read it is reported as
//!   `AlreadyConsumed`, not a panic

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::OnceCell;

use crate::http::payload;
use crate::observability::metrics;
use crate::resilience::signatures::is_cancellation;
use crate::transport::{RawResponse, ResponseBody};
use crate::types::{ErrorInfo, ErrorKind};

static NEXT_RESPONSE_ID: AtomicU64 = AtomicU64::new(1);

struct ConsumptionState {
    consumed: bool,
    body: Option<Box<dyn ResponseBody>>,
}

/// A raw response whose payload can be read exactly once.
pub struct GuardedResponse {
    response_id: u64,
    status: u16,
    state: Mutex<ConsumptionState>,
    text: OnceCell<Result<String, ErrorInfo>>,
}

impl GuardedResponse {
    pub fn wrap(raw: RawResponse) -> Self {
        Self {
            response_id: NEXT_RESPONSE_ID.fetch_add(1, Ordering::Relaxed),
            status: raw.status,
            state: Mutex::new(ConsumptionState {
                consumed: false,
                body: Some(raw.body),
            }),
            text: OnceCell::new(),
        }
    }

    pub fn response_id(&self) -> u64 {
        self.response_id
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_consumed(&self) -> bool {
        self.lock_state().consumed
    }

    /// Payload as text. The first call performs the only read.
    pub async fn text(&self) -> Result<String, ErrorInfo> {
        self.text.get_or_init(|| self.read_once()).await.clone()
    }

    /// Payload as JSON, derived from the memoized text.
    pub async fn json(&self) -> Result<Value, ErrorInfo> {
        let text = self.text().await?;
        payload::parse(&text)
    }

    /// Take the raw body out from under the guard.
    ///
    /// Once the guard has started its own read this fails with
    /// `AlreadyConsumed`; if it succeeds, the guard itself can no longer
    /// read and its accessors report `AlreadyConsumed` instead.
    pub fn raw_body(&self) -> Result<Box<dyn ResponseBody>, ErrorInfo> {
        match self.begin_read() {
            Some(body) => Ok(body),
            None => {
                tracing::warn!(
                    response_id = self.response_id,
                    "Raw body requested after the guard consumed it"
                );
                Err(self.already_consumed())
            }
        }
    }

    async fn read_once(&self) -> Result<String, ErrorInfo> {
        let Some(body) = self.begin_read() else {
            return Err(self.already_consumed());
        };

        match body.read_text().await {
            Ok(text) => {
                tracing::debug!(
                    response_id = self.response_id,
                    status = self.status,
                    bytes = text.len(),
                    "Response body consumed"
                );
                metrics::record_body_read(text.len());
                Ok(text)
            }
            Err(e) if is_cancellation(&e) => Err(ErrorInfo::aborted(format!(
                "reading response body was cancelled: {}",
                e.message
            ))),
            Err(e) => Err(ErrorInfo::network(format!(
                "failed to read response body: {}",
                e.message
            ))),
        }
    }

    /// Atomically flip `consumed` and hand out the body. `None` if it was
    /// already consumed.
    fn begin_read(&self) -> Option<Box<dyn ResponseBody>> {
        let mut state = self.lock_state();
        if state.consumed {
            return None;
        }
        state.consumed = true;
        state.body.take()
    }

    fn already_consumed(&self) -> ErrorInfo {
        ErrorInfo::new(
            ErrorKind::AlreadyConsumed,
            format!("response {} body was already consumed", self.response_id),
        )
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ConsumptionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for GuardedResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedResponse")
            .field("response_id", &self.response_id)
            .field("status", &self.status)
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use futures_util::future::BoxFuture;
    use serde_json::json;

    use crate::transport::{TransportBinding, TransportError};

    /// Body that counts reads and refuses a second one.
    struct CountingBody {
        text: String,
        reads: Arc<AtomicUsize>,
    }

    impl ResponseBody for CountingBody {
        fn read_text(self: Box<Self>) -> BoxFuture<'static, Result<String, TransportError>> {
            Box::pin(async move {
                let previous = self.reads.fetch_add(1, Ordering::SeqCst);
                if previous > 0 {
                    return Err(TransportError::new(TransportBinding::Scripted, "body", "body stream already read"));
                }
                tokio::task::yield_now().await;
                Ok(self.text)
            })
        }
    }

    fn counting(status: u16, text: &str) -> (GuardedResponse, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        let body = CountingBody {
            text: text.to_string(),
            reads: reads.clone(),
        };
        (GuardedResponse::wrap(RawResponse::new(status, Box::new(body))), reads)
    }

    #[tokio::test]
    async fn test_text_then_json_reads_once() {
        let (guarded, reads) = counting(200, r#"{"user":{"id":1},"token":"t"}"#);

        let text = guarded.text().await.unwrap();
        let value = guarded.json().await.unwrap();
        let again = guarded.text().await.unwrap();

        assert_eq!(text, again);
        assert_eq!(value["token"], json!("t"));
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert!(guarded.is_consumed());
    }

    #[tokio::test]
    async fn test_concurrent_accessors_share_one_read() {
        let (guarded, reads) = counting(200, r#"{"ok":true}"#);

        let (a, b, c) = tokio::join!(guarded.text(), guarded.json(), guarded.json());
        assert!(a.is_ok());
        assert_eq!(b.unwrap(), json!({"ok": true}));
        assert_eq!(c.unwrap(), json!({"ok": true}));
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_body() {
        let (guarded, _) = counting(200, "");
        assert_eq!(guarded.text().await.unwrap(), "");
        let err = guarded.json().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::EmptyBody);
    }

    #[tokio::test]
    async fn test_raw_body_after_read_is_already_consumed() {
        let (guarded, _) = counting(200, "{}");
        guarded.text().await.unwrap();

        let err = guarded.raw_body().err().unwrap();
        assert_eq!(err.kind, ErrorKind::AlreadyConsumed);
    }

    #[tokio::test]
    async fn test_guard_reports_body_taken_outside() {
        let (guarded, reads) = counting(200, "{}");
        let raw = guarded.raw_body().unwrap();
        assert_eq!(raw.read_text().await.unwrap(), "{}");

        let err = guarded.text().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::AlreadyConsumed);
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }
}
