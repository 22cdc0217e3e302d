//! Protocol controllers and the registry that owns them.
//!
//! # Data Flow
//! ```text
//! ConfigSnapshot + running EngineHandle
//!     → registry.rs (filter enabled descriptors, fetch order)
//!     → controller.rs (one ProtocolController per inbound)
//!     → hooks.rs (traffic counters shared with the engine)
//! ```

pub mod controller;
pub mod hooks;
pub mod registry;

pub use controller::{ControllerError, ProtocolController};
pub use hooks::{TrafficHooks, TrafficStats};
pub use registry::{ControllerRegistry, RegistryError};
