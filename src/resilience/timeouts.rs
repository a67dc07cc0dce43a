//! Timeout enforcement.
//!
//! # Responsibilities
//! - Turn an elapsed deadline into a cancellation of an operation token
//! - Clear the schedule as soon as the operation completes
//!
//! # Design Decisions
//! - A timeout cancels with `CancelReason::Timeout`, so callers can tell
//!   "timed out" from "cancelled" even though the transport effect is the same
//! - The timer is a spawned task owned by a guard; dropping the guard
//!   disarms it
//! - Sleeping goes through the injected clock

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::resilience::abort::{CancelReason, CancellationToken, OperationLease};
use crate::resilience::clock::SharedClock;

/// Default deadline for login calls.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(15);

/// Default deadline for every other call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Arms deadlines on cancellation tokens.
#[derive(Clone)]
pub struct TimeoutManager {
    clock: SharedClock,
}

impl TimeoutManager {
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }

    /// Cancel `token` with [`CancelReason::Timeout`] after `duration`
    /// unless it is cancelled first or the returned guard is dropped.
    pub fn with_timeout(&self, token: &CancellationToken, duration: Duration) -> TimeoutGuard {
        let token = token.clone();
        let sleep = self.clock.sleep(duration);
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = sleep => {
                    if token.cancel(CancelReason::Timeout) {
                        tracing::debug!(timeout_ms = duration.as_millis() as u64, "Deadline elapsed");
                    }
                }
                _ = token.cancelled() => {}
            }
        });
        TimeoutGuard { task, duration }
    }

    /// Arm the deadline recorded on a leased handle, if it has one.
    pub fn arm(&self, lease: &OperationLease) -> Option<TimeoutGuard> {
        let deadline = lease.deadline?;
        let remaining = deadline.saturating_duration_since(self.clock.now());
        Some(self.with_timeout(lease.token(), remaining))
    }
}

impl std::fmt::Debug for TimeoutManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutManager").finish()
    }
}

/// Scheduled timeout; disarmed on drop.
#[derive(Debug)]
pub struct TimeoutGuard {
    task: JoinHandle<()>,
    duration: Duration,
}

impl TimeoutGuard {
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Explicitly clear the schedule (same as dropping the guard).
    pub fn disarm(self) {}
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}
