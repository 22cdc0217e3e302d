//! Local configuration subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → NodeConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → non-blocking request on the reload queue
//!     → coordinator loads a fresh NodeConfig when the reload runs
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Which inbounds run is decided by the panel, not this file

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError, ConfigSource, FileConfigSource};
pub use schema::{ApiConfig, EngineSettings, LogConfig, MetricsConfig, NodeConfig, WatchConfig};
