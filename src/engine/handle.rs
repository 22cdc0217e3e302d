//! Ownership wrapper around one engine instance.

use std::sync::{Arc, Weak};

use crate::config::NodeConfig;
use crate::engine::{EngineConfig, EngineError, ProxyEngine};
use crate::lifecycle::signals::ReloadTrigger;
use crate::panel::ConfigSnapshot;

/// Owns one engine instance for the duration of a reload cycle.
///
/// Exactly one handle is active per coordinator. `stop` is idempotent and
/// a running handle is stopped when dropped.
pub struct EngineHandle {
    engine: Arc<dyn ProxyEngine>,
    reload_trigger: Option<ReloadTrigger>,
    running: bool,
}

impl EngineHandle {
    pub fn new(engine: Arc<dyn ProxyEngine>) -> Self {
        Self {
            engine,
            reload_trigger: None,
            running: false,
        }
    }

    /// Attach the reload queue handed over from the previous engine.
    pub fn set_reload_trigger(&mut self, trigger: ReloadTrigger) {
        self.reload_trigger = Some(trigger);
    }

    /// Detach the reload queue so it can move to the next engine.
    pub fn take_reload_trigger(&mut self) -> Option<ReloadTrigger> {
        self.reload_trigger.take()
    }

    pub fn reload_trigger(&self) -> Option<&ReloadTrigger> {
        self.reload_trigger.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start the engine from a snapshot.
    pub fn start(&mut self, snapshot: &ConfigSnapshot, config: &NodeConfig) -> Result<(), EngineError> {
        if self.running {
            return Err(EngineError::AlreadyRunning);
        }

        let engine_config = EngineConfig::from_snapshot(snapshot, config);
        self.engine.set_reload_trigger(self.reload_trigger.clone());
        if let Err(e) = self.engine.start(&engine_config) {
            self.engine.set_reload_trigger(None);
            return Err(e);
        }
        self.running = true;

        tracing::info!(
            server_id = engine_config.server_id,
            declared_inbounds = engine_config.declared_inbounds,
            "Engine started"
        );
        Ok(())
    }

    /// Stop the engine. Safe if never started or already stopped.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        if !self.running {
            return Ok(());
        }
        self.running = false;
        self.engine.set_reload_trigger(None);
        self.engine.close()?;
        tracing::info!("Engine stopped");
        Ok(())
    }

    /// Non-owning engine reference for controllers.
    ///
    /// Returns `None` when the engine cannot accept controllers.
    pub fn bind(&self) -> Option<Weak<dyn ProxyEngine>> {
        if self.running {
            Some(Arc::downgrade(&self.engine))
        } else {
            None
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "Engine stop on drop failed");
        }
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("running", &self.running)
            .field("has_reload_trigger", &self.reload_trigger.is_some())
            .finish()
    }
}
