//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured fields, request id)
//!     → metrics.rs (counters, gauges, histograms via the `metrics` facade)
//!
//! Consumers:
//!     → logging.rs subscriber (stderr, text or JSON)
//!     → whatever metrics recorder the host application installs
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows from transport logs to the backend header
//! - Metrics are cheap (atomic increments); no exporter is bundled
//! - Aborted/timed-out calls log at debug, other failures at warn

pub mod logging;
pub mod metrics;
