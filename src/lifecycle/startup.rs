//! Startup orchestration.
//!
//! # Responsibilities
//! - Load configuration and initialize logging and metrics
//! - Bring up the first engine/controller pair
//! - Start the file watcher and signal handlers
//! - Hand control to the reload coordinator loop
//!
//! # Design Decisions
//! - Fail fast: any error before the loop starts is fatal
//! - After the loop starts, nothing short of a terminate signal ends it

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::watcher::ConfigWatcher;
use crate::config::{ConfigError, ConfigSource, FileConfigSource, LogConfig};
use crate::engine::LoopbackEngineFactory;
use crate::lifecycle::coordinator::{ReloadCoordinator, ReloadError};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::{install_signal_handlers, reload_queue, SignalMultiplexer};
use crate::observability::{logging, metrics};
use crate::panel::HttpControlPlane;

/// Errors that prevent the agent from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to read config file: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to install signal handlers: {0}")]
    Signals(#[from] std::io::Error),

    #[error(transparent)]
    Bootstrap(#[from] ReloadError),

    #[error("Failed to start config watcher: {0}")]
    Watch(#[from] notify::Error),
}

/// Run the agent until a termination signal arrives.
pub async fn run_server(config_path: &Path, watch: bool) -> Result<(), StartupError> {
    let source = FileConfigSource::new(config_path);
    let config = match source.load() {
        Ok(config) => config,
        Err(e) => {
            logging::init_logging(&LogConfig::default());
            tracing::error!(error = %e, path = ?source.path(), "Failed to read config file");
            return Err(e.into());
        }
    };
    logging::init_logging(&config.log);
    tracing::info!(path = ?source.path(), server_id = config.api.server_id, "Config loaded");

    if config.metrics.enabled {
        match config.metrics.address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.metrics.address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let (trigger, reloads) = reload_queue();
    let mut events = SignalMultiplexer::new(shutdown.subscribe(), reloads);
    let _signals = install_signal_handlers(shutdown.clone())?;

    let mut coordinator = ReloadCoordinator::new(
        Box::new(source),
        Arc::new(HttpControlPlane::new()),
        Arc::new(LoopbackEngineFactory::default()),
        trigger.clone(),
    );
    let started = match coordinator.bootstrap().await {
        Ok(started) => started,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            coordinator.shutdown();
            return Err(e.into());
        }
    };
    tracing::info!("Started {} nodes", started);

    let _watcher = if watch {
        let watcher = ConfigWatcher::new(config_path, trigger)
            .with_poll_interval(Duration::from_secs(config.watch.poll_interval_secs))
            .run();
        match watcher {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::error!(error = %e, "Start watch failed");
                coordinator.shutdown();
                return Err(e.into());
            }
        }
    } else {
        None
    };

    coordinator.run(&mut events).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
