//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Configure log level from config, overridable via `RUST_LOG`
//! - Optionally append to a log file
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Falls back to stdout if the log file cannot be opened

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

/// Default filter directive for a configured level.
pub fn default_filter(level: &str) -> String {
    let level = match level.to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        other => other.to_string(),
    };
    format!("warn,node_agent={}", level)
}

/// Install the global subscriber.
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(&config.level)));

    let (file, open_error) = if config.output.is_empty() {
        (None, None)
    } else {
        match OpenOptions::new().create(true).append(true).open(&config.output) {
            Ok(file) => (Some(file), None),
            Err(e) => (None, Some(e)),
        }
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match file {
        Some(file) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
            .try_init(),
        None => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    if installed.is_err() {
        tracing::debug!("Global subscriber already installed");
    }

    if let Some(e) = open_error {
        tracing::error!(
            error = %e,
            output = %config.output,
            "Failed to open log file, using stdout instead"
        );
    }
}
