//! Metrics collection.
//!
//! # Responsibilities
//! - Define coordinator metrics (transport calls, dedup hits, outcomes)
//! - Keep call sites to one line
//!
//! # Metrics
//! - `reqcoord_transport_calls_total` (counter): underlying calls by method
//! - `reqcoord_dedup_hits_total` (counter): callers attached to an in-flight entry
//! - `reqcoord_outcomes_total` (counter): settled calls by operation kind and result kind
//! - `reqcoord_request_duration_seconds` (histogram): latency of settled calls
//! - `reqcoord_pending_entries` (gauge): live single-flight entries
//! - `reqcoord_body_bytes` (histogram): size of response bodies read
//!
//! # Design Decisions
//! - Facade only; the embedding application installs the recorder
//! - Labels are low-cardinality (no URLs)

use std::time::Duration;

pub fn record_transport_call(method: &str) {
    ::metrics::counter!("reqcoord_transport_calls_total", "method" => method.to_string()).increment(1);
}

pub fn record_dedup_hit() {
    ::metrics::counter!("reqcoord_dedup_hits_total").increment(1);
}

/// `outcome` is `"success"` or an error kind label.
pub fn record_outcome(operation: &'static str, outcome: &'static str, elapsed: Duration) {
    ::metrics::counter!("reqcoord_outcomes_total", "operation" => operation, "outcome" => outcome)
        .increment(1);
    ::metrics::histogram!("reqcoord_request_duration_seconds", "operation" => operation)
        .record(elapsed.as_secs_f64());
}

pub fn record_pending_entries(count: usize) {
    ::metrics::gauge!("reqcoord_pending_entries").set(count as f64);
}

pub fn record_body_read(bytes: usize) {
    ::metrics::histogram!("reqcoord_body_bytes").record(bytes as f64);
}
