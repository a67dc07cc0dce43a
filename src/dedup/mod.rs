//! Request deduplication subsystem.
//!
//! # Data Flow
//! ```text
//! Caller (method, url, body)
//!     → fingerprint.rs (canonical key; body key order ignored)
//!     → singleflight.rs
//!         entry exists  → clone shared future
//!         no entry      → insert entry, run work once on a driver task
//!     ← ApiResult (identical for every attached caller)
//!     → driver evicts entry after the grace window
//! ```

pub mod fingerprint;
pub mod singleflight;

pub use fingerprint::{canonical_json, Fingerprint};
pub use singleflight::{Deduplicator, PendingResult, DEFAULT_GRACE};
