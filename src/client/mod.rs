//! Coordinated API client.
//!
//! # Data Flow
//! ```text
//! login(credentials) / generic_request(ApiRequest)
//!     → fingerprint (method, url, canonical body)
//!     → dedup: attach to in-flight entry, or
//!         → aborts.create_with_deadline(operation id)   (supersedes older)
//!         → timeouts.arm(lease)
//!         → transport.send ─┬─ response → GuardedResponse → payload::interpret
//!                           └─ token cancelled → Aborted / Timeout
//!     ← ApiResult (same value for every attached caller)
//! ```

pub mod auth;
pub mod coordinator;

pub use auth::{Credentials, LoginData, LoginState, Session, LOGIN_OPERATION};
pub use coordinator::{Coordinator, CoordinatorError};
