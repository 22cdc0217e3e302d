//! Proxy engine integration.
//!
//! # Data Flow
//! ```text
//! ConfigSnapshot + NodeConfig
//!     → EngineConfig (translated start-up config)
//!     → handle.rs (EngineHandle: start/stop, reload-trigger slot)
//!     → ProxyEngine (external engine behind a trait)
//!
//! Controllers:
//!     ProtocolController.start → ProxyEngine::add_inbound
//!     ProtocolController.stop  → ProxyEngine::remove_inbound
//! ```
//!
//! # Design Decisions
//! - Engine calls are synchronous; the coordinator runs them inline
//! - The engine may request a reload only through its trigger slot
//! - `loopback.rs` is a minimal engine so the binary runs end to end

pub mod handle;
pub mod loopback;

use std::sync::Arc;

use thiserror::Error;

use crate::config::NodeConfig;
use crate::lifecycle::signals::ReloadTrigger;
use crate::node::hooks::TrafficHooks;
use crate::panel::{ConfigSnapshot, ProtocolDescriptor};

pub use handle::EngineHandle;
pub use loopback::{LoopbackEngine, LoopbackEngineFactory};

/// Start-up configuration handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Panel identity of this node.
    pub server_id: u64,
    /// Engine log level.
    pub log_level: String,
    /// Maximum concurrent connections per inbound.
    pub max_connections: usize,
    /// Number of inbounds the panel declared.
    pub declared_inbounds: usize,
}

impl EngineConfig {
    /// Translate a snapshot and the local configuration into engine terms.
    pub fn from_snapshot(snapshot: &ConfigSnapshot, config: &NodeConfig) -> Self {
        Self {
            server_id: snapshot.server_id,
            log_level: config.log.level.to_ascii_lowercase(),
            max_connections: config.engine.max_connections,
            declared_inbounds: snapshot.total,
        }
    }
}

/// Everything the engine needs to serve one inbound.
#[derive(Debug, Clone)]
pub struct InboundSpec {
    pub tag: String,
    pub descriptor: ProtocolDescriptor,
    pub hooks: Arc<TrafficHooks>,
}

/// Errors reported by an engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Start called on a running engine.
    #[error("Engine is already running")]
    AlreadyRunning,

    /// Operation requires a running engine.
    #[error("Engine is not running")]
    NotRunning,

    /// The engine rejected its start-up configuration.
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// An inbound with this tag is already registered.
    #[error("Inbound '{0}' already exists")]
    DuplicateInbound(String),

    /// No inbound with this tag is registered.
    #[error("Inbound '{0}' not found")]
    UnknownInbound(String),

    /// The inbound's listener could not be bound.
    #[error("Failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// No async runtime available to drive listeners.
    #[error("No async runtime available")]
    NoRuntime,

    /// Engine failed to shut down cleanly.
    #[error("Engine close failed: {0}")]
    Close(String),
}

/// The external proxy engine.
///
/// Implementations are internally synchronized; every method takes `&self`
/// so controllers can hold a non-owning reference.
pub trait ProxyEngine: Send + Sync {
    /// Start the engine. Fails if the configuration is rejected.
    fn start(&self, config: &EngineConfig) -> Result<(), EngineError>;

    /// Stop the engine and release every inbound.
    fn close(&self) -> Result<(), EngineError>;

    /// Begin serving an inbound.
    fn add_inbound(&self, inbound: InboundSpec) -> Result<(), EngineError>;

    /// Stop serving an inbound.
    fn remove_inbound(&self, tag: &str) -> Result<(), EngineError>;

    /// Install or clear the slot the engine uses to request a reload.
    fn set_reload_trigger(&self, trigger: Option<ReloadTrigger>);
}

/// Creates one engine instance per reload cycle.
pub trait EngineFactory: Send + Sync {
    fn create(&self, config: &NodeConfig) -> Arc<dyn ProxyEngine>;
}
