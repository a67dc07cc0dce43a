//! Single-flight request deduplication.
//!
//! # Responsibilities
//! - Keep at most one pending entry per fingerprint
//! - Invoke the work exactly once and share its result with every caller
//!   that attaches before eviction
//! - Evict settled entries after the grace window
//!
//! # Design Decisions
//! - The work runs on a spawned driver task, so settlement and eviction
//!   happen even if every caller drops its future
//! - A panic in the work, synchronous or async, becomes an `Unknown`
//!   result; an entry can never get stuck
//! - Aborted/timed-out results are evicted immediately so a retry starts
//!   clean
//! - Eviction is generation-checked: a late driver never removes a newer
//!   entry for the same fingerprint

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{self as future_util, BoxFuture, Shared};
use futures_util::FutureExt;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::dedup::fingerprint::Fingerprint;
use crate::observability::metrics;
use crate::resilience::clock::SharedClock;
use crate::types::{ApiResult, ErrorInfo};

/// Default retention after settlement.
pub const DEFAULT_GRACE: Duration = Duration::from_millis(1000);

/// Future shared by every caller attached to one entry.
pub type PendingResult<T> = Shared<BoxFuture<'static, ApiResult<T>>>;

struct PendingEntry<T: Clone> {
    future: PendingResult<T>,
    started_at: Instant,
    generation: u64,
}

/// Single-flight map keyed by [`Fingerprint`].
pub struct Deduplicator<T: Clone = Value> {
    pending: Arc<DashMap<Fingerprint, PendingEntry<T>>>,
    next_generation: Arc<AtomicU64>,
    grace: Duration,
    clock: SharedClock,
}

impl<T: Clone> Clone for Deduplicator<T> {
    fn clone(&self) -> Self {
        Self {
            pending: self.pending.clone(),
            next_generation: self.next_generation.clone(),
            grace: self.grace,
            clock: self.clock.clone(),
        }
    }
}

impl<T> Deduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(grace: Duration, clock: SharedClock) -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            next_generation: Arc::new(AtomicU64::new(1)),
            grace,
            clock,
        }
    }

    /// Attach to the pending call for `fingerprint`, or start one.
    ///
    /// `perform` is called synchronously, at most once per entry, and only
    /// by the caller that creates the entry.
    pub fn deduped_call<F, Fut>(&self, fingerprint: Fingerprint, perform: F) -> PendingResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        let (shared, generation, tx) = match self.pending.entry(fingerprint.clone()) {
            Entry::Occupied(occupied) => {
                let entry = occupied.get();
                tracing::debug!(
                    fingerprint = %fingerprint,
                    age_ms = self.clock.now().saturating_duration_since(entry.started_at).as_millis() as u64,
                    "Attaching to in-flight request"
                );
                metrics::record_dedup_hit();
                return entry.future.clone();
            }
            Entry::Vacant(vacant) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = oneshot::channel::<ApiResult<T>>();
                let shared = rx
                    .map(|received| {
                        received.unwrap_or_else(|_| {
                            ApiResult::failure(ErrorInfo::unknown("request driver stopped before settling"), 0)
                        })
                    })
                    .boxed()
                    .shared();
                vacant.insert(PendingEntry {
                    future: shared.clone(),
                    started_at: self.clock.now(),
                    generation,
                });
                (shared, generation, tx)
            }
        };
        metrics::record_pending_entries(self.pending.len());

        // Map lock released; safe to run caller code now.
        let work: BoxFuture<'static, ApiResult<T>> = match panic::catch_unwind(AssertUnwindSafe(perform)) {
            Ok(fut) => fut.boxed(),
            Err(payload) => future_util::ready(panicked(&fingerprint, payload)).boxed(),
        };
        self.spawn_driver(fingerprint, generation, work, tx);
        shared
    }

    fn spawn_driver(
        &self,
        fingerprint: Fingerprint,
        generation: u64,
        work: BoxFuture<'static, ApiResult<T>>,
        tx: oneshot::Sender<ApiResult<T>>,
    ) {
        let pending = self.pending.clone();
        let clock = self.clock.clone();
        let grace = self.grace;

        tokio::spawn(async move {
            let result = match AssertUnwindSafe(work).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => panicked(&fingerprint, payload),
            };

            let retain = !result.error_kind().is_some_and(|kind| kind.is_expected());
            // Every caller may have gone away; nothing to deliver then.
            let _ = tx.send(result);

            if retain && !grace.is_zero() {
                clock.sleep(grace).await;
            }
            if pending
                .remove_if(&fingerprint, |_, entry| entry.generation == generation)
                .is_some()
            {
                tracing::trace!(fingerprint = %fingerprint, generation, "Pending entry evicted");
            }
            metrics::record_pending_entries(pending.len());
        });
    }

    /// Drop the entry for `fingerprint` regardless of its state.
    ///
    /// Callers already attached keep their future.
    pub fn evict(&self, fingerprint: &Fingerprint) -> bool {
        self.pending.remove(fingerprint).is_some()
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.pending.contains_key(fingerprint)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Forget every entry (teardown).
    pub fn clear(&self) {
        self.pending.clear();
        metrics::record_pending_entries(0);
    }
}

fn panicked<T>(fingerprint: &Fingerprint, payload: Box<dyn Any + Send>) -> ApiResult<T> {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!(fingerprint = %fingerprint, panic = %message, "Request work panicked");
    ApiResult::failure(ErrorInfo::unknown(format!("request failed unexpectedly: {message}")), 0)
}

impl<T: Clone> std::fmt::Debug for Deduplicator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deduplicator")
            .field("pending", &self.pending.len())
            .field("grace", &self.grace)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use reqwest::Method;
    use serde_json::json;

    use crate::resilience::clock::tokio_clock;
    use crate::types::ErrorKind;

    fn fp(path: &str) -> Fingerprint {
        let url = url::Url::parse(&format!("http://church.local{path}")).unwrap();
        Fingerprint::new(&Method::GET, &url, None)
    }

    fn counted(
        calls: &Arc<AtomicUsize>,
        result: ApiResult<Value>,
        delay: Duration,
    ) -> impl FnOnce() -> BoxFuture<'static, ApiResult<Value>> {
        let calls = calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(delay).await;
                result
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_call() {
        let dedup: Deduplicator = Deduplicator::new(DEFAULT_GRACE, tokio_clock());
        let calls = Arc::new(AtomicUsize::new(0));
        let ok = ApiResult::success(json!({"n": 1}), 200);

        let futures: Vec<_> = (0..5)
            .map(|_| dedup.deduped_call(fp("/members"), counted(&calls, ok.clone(), Duration::from_millis(50))))
            .collect();
        let results = futures_util::future::join_all(futures).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| *r == ok));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_joiner_within_grace_reuses_result() {
        let dedup: Deduplicator = Deduplicator::new(DEFAULT_GRACE, tokio_clock());
        let calls = Arc::new(AtomicUsize::new(0));
        let ok = ApiResult::success(json!(1), 200);

        dedup.deduped_call(fp("/a"), counted(&calls, ok.clone(), Duration::ZERO)).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        let again = dedup.deduped_call(fp("/a"), counted(&calls, ok.clone(), Duration::ZERO)).await;

        assert_eq!(again, ok);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_after_grace() {
        let dedup: Deduplicator = Deduplicator::new(DEFAULT_GRACE, tokio_clock());
        let calls = Arc::new(AtomicUsize::new(0));
        let ok = ApiResult::success(json!(1), 200);

        dedup.deduped_call(fp("/a"), counted(&calls, ok.clone(), Duration::ZERO)).await;
        tokio::time::sleep(DEFAULT_GRACE + Duration::from_millis(10)).await;
        assert_eq!(dedup.pending_count(), 0);

        dedup.deduped_call(fp("/a"), counted(&calls, ok, Duration::ZERO)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_panic_does_not_stick() {
        let dedup: Deduplicator = Deduplicator::new(Duration::ZERO, tokio_clock());

        let result = dedup
            .deduped_call(fp("/boom"), || -> BoxFuture<'static, ApiResult<Value>> { panic!("boom") })
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::Unknown));
        assert!(result.error.unwrap().message.contains("boom"));

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!dedup.contains(&fp("/boom")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_panic_does_not_stick() {
        let dedup: Deduplicator = Deduplicator::new(DEFAULT_GRACE, tokio_clock());

        let result = dedup
            .deduped_call(fp("/boom"), || async {
                tokio::task::yield_now().await;
                if fp("/boom").method == "GET" {
                    panic!("late boom");
                }
                ApiResult::success(Value::Null, 200)
            })
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::Unknown));

        tokio::time::sleep(DEFAULT_GRACE * 2).await;
        assert_eq!(dedup.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expected_failures_evicted_immediately() {
        let dedup: Deduplicator = Deduplicator::new(DEFAULT_GRACE, tokio_clock());
        let calls = Arc::new(AtomicUsize::new(0));
        let aborted = ApiResult::failure(ErrorInfo::aborted("cancelled"), 0);

        dedup.deduped_call(fp("/a"), counted(&calls, aborted, Duration::ZERO)).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(dedup.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settles_when_all_callers_dropped() {
        let dedup: Deduplicator = Deduplicator::new(Duration::ZERO, tokio_clock());
        let calls = Arc::new(AtomicUsize::new(0));
        let ok = ApiResult::success(json!(1), 200);

        drop(dedup.deduped_call(fp("/a"), counted(&calls, ok, Duration::from_millis(100))));
        assert_eq!(dedup.pending_count(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(dedup.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_driver_does_not_evict_newer_entry() {
        let dedup: Deduplicator = Deduplicator::new(DEFAULT_GRACE, tokio_clock());
        let calls = Arc::new(AtomicUsize::new(0));
        let ok = ApiResult::success(json!(1), 200);

        dedup.deduped_call(fp("/a"), counted(&calls, ok.clone(), Duration::ZERO)).await;
        assert!(dedup.evict(&fp("/a")));

        // New entry, still in flight when the old driver's grace expires.
        let second = dedup.deduped_call(fp("/a"), counted(&calls, ok, Duration::from_secs(5)));
        tokio::time::sleep(DEFAULT_GRACE + Duration::from_millis(10)).await;
        assert!(dedup.contains(&fp("/a")));

        second.await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
