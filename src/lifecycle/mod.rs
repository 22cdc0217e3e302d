//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Init logging/metrics → Bootstrap first pair → Watch → Loop
//!
//! Events (signals.rs):
//!     SIGTERM/SIGINT         → shutdown.rs broadcast → Terminate
//!     config file change     → reload queue (depth 1) → Reload
//!     engine reload request  → reload queue (depth 1) → Reload
//!
//! Coordinator (coordinator.rs):
//!     Reload    → stop old pair → load → fetch → start engine → start controllers
//!     Terminate → stop controllers → stop engine → exit loop
//! ```
//!
//! # Design Decisions
//! - One loop owns the engine and controllers; producers only enqueue
//! - Reloads run strictly one at a time and are never cancelled
//! - Termination is checked between events only

pub mod coordinator;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use coordinator::{CoordinatorState, ReloadCoordinator, ReloadError};
pub use shutdown::Shutdown;
pub use signals::{reload_queue, LifecycleEvent, ReloadEvents, ReloadTrigger, SignalMultiplexer};
