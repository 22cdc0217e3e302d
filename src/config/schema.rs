//! Configuration schema definitions.
//!
//! This module defines the local configuration of the node agent.
//! All types derive Serde traits for deserialization from the TOML file.
//! Everything that describes which inbounds run comes from the panel,
//! not from here.

use serde::{Deserialize, Serialize};

/// Root configuration for the node agent.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct NodeConfig {
    /// Control-plane (panel) connection settings.
    pub api: ApiConfig,

    /// Log sink settings.
    pub log: LogConfig,

    /// Settings handed to the proxy engine on start.
    pub engine: EngineSettings,

    /// Prometheus exporter settings.
    pub metrics: MetricsConfig,

    /// Config file watcher settings.
    pub watch: WatchConfig,
}

/// Control-plane connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the panel (e.g., "https://panel.example.com").
    pub api_host: String,

    /// Identity of this node on the panel.
    pub server_id: u64,

    /// Shared secret sent as a bearer token.
    pub secret_key: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_host: "http://127.0.0.1:8080".to_string(),
            server_id: 1,
            secret_key: String::new(),
            timeout_secs: 10,
        }
    }
}

/// Log sink settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Append logs to this file instead of stdout when non-empty.
    pub output: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: String::new(),
        }
    }
}

/// Engine start-up settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Maximum concurrent connections per inbound (backpressure).
    pub max_connections: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_connections: 1024,
        }
    }
}

/// Metrics exporter settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable the Prometheus endpoint.
    pub enabled: bool,

    /// Metrics endpoint bind address.
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Config file watcher settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Poll interval for backends that fall back to polling.
    pub poll_interval_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 2,
        }
    }
}
