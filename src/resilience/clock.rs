//! Injectable time source.
//!
//! Everything in the coordinator that waits or stamps a time goes through a
//! [`Clock`], so tests can drive time with tokio's paused clock or a custom
//! implementation instead of ambient wall-clock state.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::time::Instant;

/// Source of the current instant and of sleeps.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Shared handle to a clock.
pub type SharedClock = Arc<dyn Clock>;

/// Clock backed by `tokio::time` (honours `tokio::time::pause`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Default shared clock.
pub fn tokio_clock() -> SharedClock {
    Arc::new(TokioClock)
}
