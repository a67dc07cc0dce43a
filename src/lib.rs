//! Client-side request coordination.
//!
//! Collapses duplicate in-flight calls, cancels superseded ones, enforces
//! deadlines, reads every response body exactly once and reports every
//! outcome as an [`ApiResult`].

pub mod client;
pub mod config;
pub mod dedup;
pub mod http;
pub mod observability;
pub mod resilience;
pub mod transport;
pub mod types;

pub use client::{Coordinator, CoordinatorError, Credentials, LoginData, LoginState};
pub use config::schema::CoordinatorConfig;
pub use http::ApiRequest;
pub use types::{ApiResult, ErrorInfo, ErrorKind, OperationId};
