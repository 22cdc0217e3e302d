//! Node agent library.
//!
//! Keeps a set of protocol inbounds in sync with the panel and reloads them
//! on config file changes, engine requests or until a termination signal.

pub mod config;
pub mod engine;
pub mod lifecycle;
pub mod node;
pub mod observability;
pub mod panel;

pub use config::NodeConfig;
pub use lifecycle::{ReloadCoordinator, Shutdown};
