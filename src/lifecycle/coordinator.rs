//! Reload coordinator.
//!
//! # Responsibilities
//! - Own the single active (engine, controller registry) pair
//! - Consume the multiplexed event stream, one event at a time
//! - Sequence each reload: stop old pair → load → fetch → start new → swap
//! - Hand the reload queue from the outgoing engine to the incoming one
//!
//! # Design Decisions
//! - Stop-then-start: the old pair is torn down before the new
//!   configuration is fetched or validated. A failed reload leaves the node
//!   without an active engine until the next successful reload.
//! - Every start/stop runs inline in the loop; a slow engine start delays
//!   every later event, termination included
//! - Reload failures are logged and never end the loop

use std::sync::Arc;

use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{ConfigError, ConfigSource};
use crate::engine::{EngineError, EngineFactory, EngineHandle};
use crate::lifecycle::signals::{LifecycleEvent, ReloadTrigger, SignalMultiplexer};
use crate::node::{ControllerRegistry, RegistryError};
use crate::observability::metrics;
use crate::panel::{ControlPlane, ControlPlaneError};

/// Coordinator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Waiting for the next event; a pair may or may not be active.
    Idle,
    ReloadInProgress,
    ShuttingDown,
    Terminated,
}

/// Errors that abort a reload cycle (or startup).
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("Failed to load config: {0}")]
    ConfigLoad(#[source] ConfigError),

    #[error("Failed to fetch server configuration: {0}")]
    ControlPlane(#[source] ControlPlaneError),

    #[error("Failed to start engine: {0}")]
    EngineStart(#[source] EngineError),

    #[error("Failed to start controllers: {0}")]
    ControllerStart(#[source] RegistryError),

    #[error("Failed to stop engine: {0}")]
    EngineStop(#[source] EngineError),
}

impl ReloadError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ReloadError::ConfigLoad(_) => "config_load",
            ReloadError::ControlPlane(_) => "control_plane",
            ReloadError::EngineStart(_) => "engine_start",
            ReloadError::ControllerStart(_) => "controller_start",
            ReloadError::EngineStop(_) => "engine_stop",
        }
    }
}

/// The running engine and the controllers bound to it.
///
/// Field order matters: controllers drop before their engine.
struct ActivePair {
    registry: ControllerRegistry,
    engine: EngineHandle,
}

/// Owns the engine/controller lifecycle and serializes reloads.
pub struct ReloadCoordinator {
    source: Box<dyn ConfigSource>,
    control_plane: Arc<dyn ControlPlane>,
    engines: Arc<dyn EngineFactory>,
    /// The reload queue while no engine holds it.
    parked_trigger: Option<ReloadTrigger>,
    active: Option<ActivePair>,
    state: CoordinatorState,
}

impl ReloadCoordinator {
    pub fn new(
        source: Box<dyn ConfigSource>,
        control_plane: Arc<dyn ControlPlane>,
        engines: Arc<dyn EngineFactory>,
        trigger: ReloadTrigger,
    ) -> Self {
        Self {
            source,
            control_plane,
            engines,
            parked_trigger: Some(trigger),
            active: None,
            state: CoordinatorState::Idle,
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Number of controllers in the active pair.
    pub fn active_controllers(&self) -> usize {
        self.active.as_ref().map(|p| p.registry.len()).unwrap_or(0)
    }

    pub fn has_active_engine(&self) -> bool {
        self.active.as_ref().map(|p| p.engine.is_running()).unwrap_or(false)
    }

    /// The active controller registry, if a pair is active.
    pub fn registry(&self) -> Option<&ControllerRegistry> {
        self.active.as_ref().map(|p| &p.registry)
    }

    /// The reload queue handle, wherever it currently lives.
    pub fn reload_trigger(&self) -> Option<&ReloadTrigger> {
        self.engine_reload_trigger().or(self.parked_trigger.as_ref())
    }

    /// The reload queue handle attached to the active engine.
    pub fn engine_reload_trigger(&self) -> Option<&ReloadTrigger> {
        self.active.as_ref().and_then(|p| p.engine.reload_trigger())
    }

    /// Bring up the first pair before the loop starts.
    ///
    /// Any error here is meant to be fatal for the process.
    pub async fn bootstrap(&mut self) -> Result<usize, ReloadError> {
        let count = self.activate().await?;
        metrics::record_active_controllers(count);
        Ok(count)
    }

    /// Run one reload cycle. Always returns to `Idle`.
    pub async fn reload(&mut self) -> Result<usize, ReloadError> {
        let span = tracing::info_span!("reload", cycle = %Uuid::new_v4());
        self.reload_cycle().instrument(span).await
    }

    async fn reload_cycle(&mut self) -> Result<usize, ReloadError> {
        self.state = CoordinatorState::ReloadInProgress;
        let result = match self.teardown() {
            Ok(()) => self.activate().await,
            Err(e) => Err(e),
        };
        self.state = CoordinatorState::Idle;

        match &result {
            Ok(count) => {
                tracing::info!(controllers = count, "Reloaded successfully");
                metrics::record_reload("success");
            }
            Err(e) => {
                tracing::warn!(
                    kind = e.kind(),
                    engine_running = self.has_active_engine(),
                    "Reload aborted"
                );
                metrics::record_reload(e.kind());
            }
        }
        metrics::record_active_controllers(self.active_controllers());
        result
    }

    /// Stop everything and enter `Terminated`.
    pub fn shutdown(&mut self) {
        self.state = CoordinatorState::ShuttingDown;
        if let Err(e) = self.teardown() {
            tracing::error!(error = %e, "Shutdown did not complete cleanly");
        }
        metrics::record_active_controllers(0);
        self.state = CoordinatorState::Terminated;
        tracing::info!("Coordinator terminated");
    }

    /// Process events until termination.
    pub async fn run(&mut self, events: &mut SignalMultiplexer) {
        tracing::info!("Coordinator waiting for events");
        loop {
            match events.next_event().await {
                LifecycleEvent::Terminate => {
                    self.shutdown();
                    return;
                }
                LifecycleEvent::Reload => {
                    tracing::info!("Received reload signal, reloading configuration");
                    if let Err(e) = self.reload().await {
                        tracing::error!(error = %e, "Reload failed");
                    }
                }
            }
        }
    }

    /// Stop the active pair, keeping its reload queue.
    fn teardown(&mut self) -> Result<(), ReloadError> {
        let Some(mut pair) = self.active.take() else {
            return Ok(());
        };
        pair.registry.stop();
        if let Some(trigger) = pair.engine.take_reload_trigger() {
            self.parked_trigger = Some(trigger);
        }
        pair.engine.stop().map_err(ReloadError::EngineStop)
    }

    /// Load, fetch, start a new pair and make it active.
    async fn activate(&mut self) -> Result<usize, ReloadError> {
        let config = self.source.load().map_err(ReloadError::ConfigLoad)?;
        let snapshot = self
            .control_plane
            .fetch_snapshot(&config.api)
            .await
            .map_err(ReloadError::ControlPlane)?;

        let mut engine = EngineHandle::new(self.engines.create(&config));
        if let Some(trigger) = self.parked_trigger.take() {
            engine.set_reload_trigger(trigger);
        }
        if let Err(e) = engine.start(&snapshot, &config) {
            self.parked_trigger = engine.take_reload_trigger();
            return Err(ReloadError::EngineStart(e));
        }

        let registry = ControllerRegistry::build(&engine, &snapshot).and_then(|mut registry| {
            registry.start()?;
            Ok(registry)
        });
        match registry {
            Ok(registry) => {
                let count = registry.len();
                tracing::info!(controllers = count, total = snapshot.total, "Controllers started");
                self.active = Some(ActivePair { registry, engine });
                Ok(count)
            }
            Err(e) => {
                // Engine stays up with nothing bound until the next reload.
                self.active = Some(ActivePair {
                    registry: ControllerRegistry::empty(),
                    engine,
                });
                Err(ReloadError::ControllerStart(e))
            }
        }
    }
}

impl std::fmt::Debug for ReloadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadCoordinator")
            .field("state", &self.state)
            .field("active_controllers", &self.active_controllers())
            .field("engine_running", &self.has_active_engine())
            .finish()
    }
}
