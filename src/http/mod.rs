//! HTTP request/response handling subsystem.
//!
//! # Data Flow
//! ```text
//! ApiRequest
//!     → request.rs (resolve URL, per-call overrides)
//!     → [transport call]
//!     → response.rs (guard the one-shot body; single text read)
//!     → payload.rs (parse JSON, classify status)
//!     → ApiResult
//! ```

pub mod payload;
pub mod request;
pub mod response;

pub use request::ApiRequest;
pub use response::GuardedResponse;
