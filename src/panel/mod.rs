//! Control-plane (panel) integration.
//!
//! # Data Flow
//! ```text
//! NodeConfig.api
//!     → client.rs (one GET per reload cycle)
//!     → types.rs (decode ServerConfigResponse)
//!     → ConfigSnapshot (immutable, total checked against list)
//! ```

pub mod client;
pub mod types;

pub use client::{ControlPlane, HttpControlPlane};
pub use types::{
    ConfigSnapshot, ControlPlaneError, Network, ProtocolDescriptor, ProtocolKind, SecurityMode,
    TransportOptions,
};
