//! Protocol controller: runtime unit for one enabled inbound.

use std::sync::{Arc, Weak};

use thiserror::Error;

use crate::engine::{EngineError, InboundSpec, ProxyEngine};
use crate::node::hooks::TrafficHooks;
use crate::panel::ProtocolDescriptor;

/// Errors raised while starting or stopping a controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The engine this controller was bound to no longer exists.
    #[error("Engine for inbound '{0}' is gone")]
    EngineGone(String),

    /// The engine refused the operation.
    #[error("Inbound '{tag}': {source}")]
    Engine {
        tag: String,
        #[source]
        source: EngineError,
    },
}

/// Binds one enabled descriptor to the shared engine.
///
/// Holds only a weak reference to the engine; the engine handle owns it.
/// Created per reload cycle and never reused.
pub struct ProtocolController {
    descriptor: ProtocolDescriptor,
    tag: String,
    engine: Weak<dyn ProxyEngine>,
    hooks: Arc<TrafficHooks>,
    started: bool,
}

impl ProtocolController {
    pub fn new(descriptor: ProtocolDescriptor, engine: Weak<dyn ProxyEngine>) -> Self {
        let tag = descriptor.tag();
        Self {
            hooks: Arc::new(TrafficHooks::new(tag.clone())),
            descriptor,
            tag,
            engine,
            started: false,
        }
    }

    pub fn descriptor(&self) -> &ProtocolDescriptor {
        &self.descriptor
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn hooks(&self) -> &Arc<TrafficHooks> {
        &self.hooks
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Register the inbound with the engine.
    pub fn start(&mut self) -> Result<(), ControllerError> {
        if self.started {
            return Ok(());
        }
        let engine = self
            .engine
            .upgrade()
            .ok_or_else(|| ControllerError::EngineGone(self.tag.clone()))?;

        engine
            .add_inbound(InboundSpec {
                tag: self.tag.clone(),
                descriptor: self.descriptor.clone(),
                hooks: self.hooks.clone(),
            })
            .map_err(|source| ControllerError::Engine {
                tag: self.tag.clone(),
                source,
            })?;
        self.started = true;

        tracing::info!(
            tag = %self.tag,
            protocol = %self.descriptor.protocol,
            port = self.descriptor.port,
            security = ?self.descriptor.security,
            network = ?self.descriptor.transport.network,
            "Controller started"
        );
        Ok(())
    }

    /// Remove the inbound from the engine. Safe to call repeatedly.
    pub fn stop(&mut self) -> Result<(), ControllerError> {
        if !self.started {
            return Ok(());
        }
        self.started = false;

        // A dropped engine has already released every inbound.
        let Some(engine) = self.engine.upgrade() else {
            return Ok(());
        };
        engine
            .remove_inbound(&self.tag)
            .map_err(|source| ControllerError::Engine {
                tag: self.tag.clone(),
                source,
            })?;

        tracing::info!(tag = %self.tag, "Controller stopped");
        Ok(())
    }
}

impl std::fmt::Debug for ProtocolController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolController")
            .field("tag", &self.tag)
            .field("started", &self.started)
            .finish()
    }
}
