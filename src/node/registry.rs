//! Controller registry.
//!
//! # Responsibilities
//! - Build one controller per enabled descriptor, in fetch order
//! - Start and stop the set as a unit
//!
//! # Design Decisions
//! - Disabled descriptors are never instantiated
//! - A failed start rolls back: controllers already started in that call
//!   are stopped in reverse order before the error is returned
//! - `stop` never fails; individual errors are logged

use thiserror::Error;

use crate::engine::EngineHandle;
use crate::node::controller::{ControllerError, ProtocolController};
use crate::panel::ConfigSnapshot;

/// Errors raised while building or starting a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Snapshot carries no protocol list.
    #[error("Configuration error: snapshot has no protocol list")]
    Configuration,

    /// Engine cannot accept controllers.
    #[error("Engine binding error: engine is not running")]
    EngineBinding,

    /// A controller failed to start.
    #[error(transparent)]
    Controller(#[from] ControllerError),
}

/// The set of controllers for one reload cycle.
#[derive(Debug, Default)]
pub struct ControllerRegistry {
    controllers: Vec<ProtocolController>,
}

impl ControllerRegistry {
    /// A registry with no controllers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build controllers for every enabled descriptor of the snapshot.
    pub fn build(engine: &EngineHandle, snapshot: &ConfigSnapshot) -> Result<Self, RegistryError> {
        let protocols = snapshot
            .protocols
            .as_ref()
            .ok_or(RegistryError::Configuration)?;
        let engine = engine.bind().ok_or(RegistryError::EngineBinding)?;

        let controllers: Vec<_> = snapshot
            .enabled()
            .map(|p| ProtocolController::new(p.clone(), engine.clone()))
            .collect();

        tracing::debug!(
            enabled = controllers.len(),
            skipped = protocols.len() - controllers.len(),
            "Controller registry built"
        );
        Ok(Self { controllers })
    }

    /// Start every controller in construction order.
    pub fn start(&mut self) -> Result<(), RegistryError> {
        for i in 0..self.controllers.len() {
            if let Err(e) = self.controllers[i].start() {
                tracing::warn!(
                    tag = %self.controllers[i].tag(),
                    rolled_back = i,
                    "Controller failed to start, rolling back"
                );
                for started in self.controllers[..i].iter_mut().rev() {
                    if let Err(stop_err) = started.stop() {
                        tracing::warn!(error = %stop_err, "Rollback stop failed");
                    }
                }
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Stop every controller. Idempotent.
    pub fn stop(&mut self) {
        for controller in &mut self.controllers {
            if let Err(e) = controller.stop() {
                tracing::warn!(error = %e, "Controller stop failed");
            }
        }
    }

    pub fn controllers(&self) -> &[ProtocolController] {
        &self.controllers
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}
