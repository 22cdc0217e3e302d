//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, connection caps > 0)
//! - Check the panel host is a usable URL
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: NodeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::NodeConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "warning", "error"];

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    /// Human readable description.
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

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &NodeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match url::Url::parse(&config.api.api_host) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(ValidationError::new(
            "api.api_host",
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new("api.api_host", e.to_string())),
    }

    if config.api.server_id == 0 {
        errors.push(ValidationError::new("api.server_id", "must be greater than 0"));
    }

    if config.api.timeout_secs == 0 {
        errors.push(ValidationError::new("api.timeout_secs", "must be greater than 0"));
    }

    if !LOG_LEVELS.contains(&config.log.level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "log.level",
            format!("unknown level '{}'", config.log.level),
        ));
    }

    if config.engine.max_connections == 0 {
        errors.push(ValidationError::new("engine.max_connections", "must be greater than 0"));
    }

    if config.metrics.enabled && config.metrics.address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "metrics.address",
            format!("invalid socket address '{}'", config.metrics.address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
