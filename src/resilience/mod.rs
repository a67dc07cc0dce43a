//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Coordinated call:
//!     → abort.rs (lease a handle for the operation id; supersede the old one)
//!     → timeouts.rs (arm the deadline on the handle's token)
//!     → transport call races token.cancelled()
//!     → On transport error: signatures.rs decides whether it was a cancellation
//! ```
//!
//! # Design Decisions
//! - Every coordinated call has a deadline
//! - Timeout and explicit cancellation share one mechanism but keep distinct reasons
//! - Time is injected through clock.rs

pub mod abort;
pub mod clock;
pub mod signatures;
pub mod timeouts;

pub use abort::{AbortCoordinator, CancelReason, CancellationToken, OperationHandle, OperationLease};
pub use clock::{Clock, SharedClock, TokioClock};
pub use timeouts::{TimeoutGuard, TimeoutManager};
