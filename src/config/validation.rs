//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, known log levels)
//! - Check the API base URL and login path resolve
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: CoordinatorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use url::Url;

use crate::config::schema::CoordinatorConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single semantic problem, tagged with the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Render a list of errors as one comma-separated line.
pub(crate) fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn validate_config(config: &CoordinatorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match Url::parse(&config.api.base_url) {
        Ok(base) => {
            if !matches!(base.scheme(), "http" | "https") {
                errors.push(ValidationError::new(
                    "api.base_url",
                    format!("unsupported scheme '{}'", base.scheme()),
                ));
            } else if base.join(&config.api.login_path).is_err() {
                errors.push(ValidationError::new("api.login_path", "does not resolve against base_url"));
            }
        }
        Err(e) => errors.push(ValidationError::new("api.base_url", e.to_string())),
    }

    if config.api.login_path.trim().is_empty() {
        errors.push(ValidationError::new("api.login_path", "must not be empty"));
    }

    for (field, value) in [
        ("timeouts.login_ms", config.timeouts.login_ms),
        ("timeouts.request_ms", config.timeouts.request_ms),
        ("timeouts.connect_ms", config.timeouts.connect_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&CoordinatorConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = CoordinatorConfig::default();
        config.api.base_url = "not a url".to_string();
        config.timeouts.login_ms = 0;
        config.timeouts.request_ms = 0;
        config.observability.log_level = "loud".to_string();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "api.base_url",
                "timeouts.login_ms",
                "timeouts.request_ms",
                "observability.log_level"
            ]
        );
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let mut config = CoordinatorConfig::default();
        config.api.base_url = "ftp://church.example/".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "api.base_url");
    }

    #[test]
    fn test_join_errors() {
        let errors = vec![
            ValidationError::new("timeouts.login_ms", "must be > 0"),
            ValidationError::new("observability.log_level", "unknown level"),
        ];
        assert_eq!(
            join_errors(&errors),
            "timeouts.login_ms: must be > 0, observability.log_level: unknown level"
        );
    }
}
