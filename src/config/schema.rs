//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! coordinator. All types derive Serde traits for deserialization from
//! config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dedup::DEFAULT_GRACE;
use crate::resilience::timeouts::{DEFAULT_LOGIN_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};

/// Root configuration for the request coordinator.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Backend API location and request defaults.
    pub api: ApiConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Single-flight deduplication settings.
    pub dedup: DedupConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Backend API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL that relative request paths are joined onto.
    pub base_url: String,

    /// Path of the login endpoint, relative to `base_url`.
    pub login_path: String,

    /// User-Agent sent with every request.
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api/".to_string(),
            login_path: "auth/login".to_string(),
            user_agent: format!("reqcoord/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Timeout configuration, in milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for a login attempt.
    pub login_ms: u64,

    /// Default deadline for generic requests.
    pub request_ms: u64,

    /// Connection establishment timeout.
    pub connect_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            login_ms: DEFAULT_LOGIN_TIMEOUT.as_millis() as u64,
            request_ms: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
            connect_ms: 5_000,
        }
    }
}

impl TimeoutConfig {
    pub fn login(&self) -> Duration {
        Duration::from_millis(self.login_ms)
    }

    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }
}

/// Deduplication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DedupConfig {
    /// How long a settled result stays shareable.
    pub grace_ms: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            grace_ms: DEFAULT_GRACE.as_millis() as u64,
        }
    }
}

impl DedupConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines instead of text.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}
