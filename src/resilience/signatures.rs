//! Cancellation signatures per transport binding.
//!
//! Transports report cancellation in different shapes: a dedicated error
//! name, a status convention, or only a message. This table is the single
//! place those shapes are listed; supporting a new transport means adding
//! rows here.

use crate::transport::{TransportBinding, TransportError};

/// How a signature recognises a cancelled call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    /// Error name, compared case-insensitively.
    Name(&'static str),
    /// Status code attached to the error.
    Status(u16),
    /// Lowercase substring of the error message.
    MessageContains(&'static str),
}

impl Matcher {
    fn matches(&self, error: &TransportError) -> bool {
        match self {
            Matcher::Name(name) => error.name.eq_ignore_ascii_case(name),
            Matcher::Status(status) => error.status == Some(*status),
            Matcher::MessageContains(needle) => {
                error.message.to_ascii_lowercase().contains(needle)
            }
        }
    }
}

/// One row of the table. `binding: None` applies to every transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancellationSignature {
    pub binding: Option<TransportBinding>,
    pub matcher: Matcher,
}

const fn any(matcher: Matcher) -> CancellationSignature {
    CancellationSignature {
        binding: None,
        matcher,
    }
}

const fn on(binding: TransportBinding, matcher: Matcher) -> CancellationSignature {
    CancellationSignature {
        binding: Some(binding),
        matcher,
    }
}

pub const CANCELLATION_SIGNATURES: &[CancellationSignature] = &[
    // hyper reports a dropped in-flight request as "operation was canceled"
    on(TransportBinding::Reqwest, Matcher::MessageContains("operation was canceled")),
    on(TransportBinding::Reqwest, Matcher::Name("canceled")),
    on(TransportBinding::Scripted, Matcher::Name("cancelled")),
    on(TransportBinding::Scripted, Matcher::MessageContains("cancelled by caller")),
    // 499 Client Closed Request
    any(Matcher::Status(499)),
    any(Matcher::Name("aborted")),
];

impl CancellationSignature {
    fn applies_to(&self, binding: TransportBinding) -> bool {
        self.binding.map_or(true, |b| b == binding)
    }
}

/// Whether `error` matches any cancellation signature for its binding.
pub fn is_cancellation(error: &TransportError) -> bool {
    CANCELLATION_SIGNATURES
        .iter()
        .any(|sig| sig.applies_to(error.binding) && sig.matcher.matches(error))
}
