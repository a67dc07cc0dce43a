//! Abort coordination.
//!
//! # Responsibilities
//! - Track at most one live cancellable handle per logical operation
//! - Cancel the previous handle when an operation id is reused
//! - Cancel one or all live operations on request
//! - Classify transport errors that really mean "cancelled"
//!
//! # Design Decisions
//! - Registry mutation is a single synchronous map operation, never split
//!   across an await
//! - Handles are leased; dropping the lease deregisters the handle only if
//!   it was not superseded in the meantime
//! - The first cancellation reason wins; later cancels are no-ops

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::resilience::clock::SharedClock;
use crate::resilience::signatures;
use crate::transport::TransportError;
use crate::types::{ErrorInfo, ErrorKind, OperationId};

/// Why an operation was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// `cancel(operation_id)` was called.
    Explicit,
    /// A newer operation with the same id replaced this one.
    Superseded,
    /// The deadline elapsed.
    Timeout,
    /// Coordinator teardown (`cancel_all`, shutdown).
    Teardown,
}

impl CancelReason {
    pub fn error_kind(self) -> ErrorKind {
        match self {
            CancelReason::Timeout => ErrorKind::Timeout,
            CancelReason::Explicit | CancelReason::Superseded | CancelReason::Teardown => {
                ErrorKind::Aborted
            }
        }
    }

    /// Error reported to every caller attached to the cancelled operation.
    pub fn to_error(self, operation_id: &OperationId) -> ErrorInfo {
        let message = match self {
            CancelReason::Explicit => format!("operation '{operation_id}' was cancelled"),
            CancelReason::Superseded => {
                format!("operation '{operation_id}' was superseded by a newer request")
            }
            CancelReason::Timeout => format!("operation '{operation_id}' timed out"),
            CancelReason::Teardown => {
                format!("operation '{operation_id}' was cancelled during teardown")
            }
        };
        ErrorInfo::new(self.error_kind(), message)
    }
}

/// Cloneable cancellation signal that remembers why it fired.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    tx: Arc<watch::Sender<Option<CancelReason>>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Signal cancellation. Returns `false` if the token was already
    /// cancelled, in which case the original reason is kept.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    pub fn reason(&self) -> Option<CancelReason> {
        *self.tx.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Resolves once the token is cancelled, yielding the reason.
    pub async fn cancelled(&self) -> CancelReason {
        let mut rx = self.tx.subscribe();
        let reason = match rx.wait_for(Option::is_some).await {
            Ok(reason) => (*reason).unwrap_or(CancelReason::Explicit),
            // The sender lives in `self`, so the channel cannot close here.
            Err(_) => CancelReason::Explicit,
        };
        reason
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// One cancellable operation registered under an id.
#[derive(Debug, Clone)]
pub struct OperationHandle {
    pub operation_id: OperationId,
    /// Unique per registration; distinguishes a handle from its successor.
    pub handle_id: u64,
    pub token: CancellationToken,
    pub created_at: Instant,
    pub deadline: Option<Instant>,
}

/// Registry of live operation handles.
#[derive(Clone)]
pub struct AbortCoordinator {
    handles: Arc<DashMap<OperationId, OperationHandle>>,
    next_handle_id: Arc<AtomicU64>,
    clock: SharedClock,
}

impl AbortCoordinator {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            handles: Arc::new(DashMap::new()),
            next_handle_id: Arc::new(AtomicU64::new(1)),
            clock,
        }
    }

    /// Register a fresh handle for `operation_id`, cancelling any live one.
    pub fn create(&self, operation_id: impl Into<OperationId>) -> OperationLease {
        self.create_with_deadline(operation_id, None)
    }

    /// Like [`create`](Self::create), recording a deadline `timeout` from now.
    pub fn create_with_deadline(
        &self,
        operation_id: impl Into<OperationId>,
        timeout: Option<Duration>,
    ) -> OperationLease {
        let operation_id = operation_id.into();
        let now = self.clock.now();
        let handle = OperationHandle {
            operation_id: operation_id.clone(),
            handle_id: self.next_handle_id.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
            created_at: now,
            deadline: timeout.map(|t| now + t),
        };

        match self.handles.entry(operation_id) {
            Entry::Occupied(mut occupied) => {
                let previous = occupied.get();
                previous.token.cancel(CancelReason::Superseded);
                tracing::debug!(
                    operation_id = %previous.operation_id,
                    previous_handle = previous.handle_id,
                    handle = handle.handle_id,
                    "Superseding live operation"
                );
                occupied.insert(handle.clone());
            }
            Entry::Vacant(vacant) => {
                vacant.insert(handle.clone());
            }
        }

        OperationLease {
            handle,
            handles: self.handles.clone(),
        }
    }

    /// Cancel and deregister `operation_id`. Idempotent.
    pub fn cancel(&self, operation_id: &OperationId) -> bool {
        self.cancel_with(operation_id, CancelReason::Explicit)
    }

    pub(crate) fn cancel_with(&self, operation_id: &OperationId, reason: CancelReason) -> bool {
        match self.handles.remove(operation_id) {
            Some((_, handle)) => {
                handle.token.cancel(reason);
                tracing::debug!(operation_id = %operation_id, ?reason, "Operation cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every live registration. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        self.cancel_all_with(CancelReason::Teardown)
    }

    pub(crate) fn cancel_all_with(&self, reason: CancelReason) -> usize {
        let ids: Vec<OperationId> = self.handles.iter().map(|e| e.key().clone()).collect();
        let cancelled = ids
            .iter()
            .filter(|id| self.cancel_with(id, reason))
            .count();
        if cancelled > 0 {
            tracing::info!(cancelled, "Cancelled all live operations");
        }
        cancelled
    }

    /// Snapshot of the live handle for `operation_id`.
    pub fn handle(&self, operation_id: &OperationId) -> Option<OperationHandle> {
        self.handles.get(operation_id).map(|r| r.value().clone())
    }

    pub fn is_live(&self, operation_id: &OperationId) -> bool {
        self.handles.contains_key(operation_id)
    }

    pub fn live_count(&self) -> usize {
        self.handles.len()
    }

    /// True once a newer registration has taken over the lease's id.
    pub fn is_superseded(&self, lease: &OperationLease) -> bool {
        self.handles
            .get(&lease.operation_id)
            .is_some_and(|live| live.handle_id != lease.handle_id)
    }

    /// Whether a transport error is really a cancellation.
    ///
    /// Delegates to the per-binding signature table so call sites never
    /// match error strings themselves.
    pub fn is_cancellation(error: &TransportError) -> bool {
        signatures::is_cancellation(error)
    }
}

impl std::fmt::Debug for AbortCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbortCoordinator")
            .field("live", &self.handles.len())
            .finish()
    }
}

/// RAII lease over a registered handle.
///
/// Dropping the lease deregisters the handle unless a newer registration
/// has already replaced it.
#[derive(Debug)]
pub struct OperationLease {
    handle: OperationHandle,
    handles: Arc<DashMap<OperationId, OperationHandle>>,
}

impl OperationLease {
    pub fn token(&self) -> &CancellationToken {
        &self.handle.token
    }

    pub fn handle(&self) -> &OperationHandle {
        &self.handle
    }
}

impl Deref for OperationLease {
    type Target = OperationHandle;
    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl Drop for OperationLease {
    fn drop(&mut self) {
        let handle_id = self.handle.handle_id;
        self.handles
            .remove_if(&self.handle.operation_id, |_, live| live.handle_id == handle_id);
    }
}
