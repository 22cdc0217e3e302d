//! OS signal handling and event multiplexing.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT)
//! - Provide the depth-1 reload queue shared by every reload producer
//! - Merge terminate and reload into one ordered event stream
//!
//! # Design Decisions
//! - Producers only enqueue; they never touch the engine or controllers
//! - A full reload slot coalesces further requests
//! - Terminate wins over a queued reload and is latched once observed

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::Shutdown;

/// Event consumed by the reload coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Terminate,
    Reload,
}

/// Producer handle of the reload queue.
///
/// Clones share the same queue; the coordinator hands the same queue from
/// engine to engine across reloads.
#[derive(Debug, Clone)]
pub struct ReloadTrigger {
    tx: mpsc::Sender<()>,
}

impl ReloadTrigger {
    /// Request a reload without blocking.
    ///
    /// Returns `true` if the request was queued, `false` if one was already
    /// pending (coalesced) or the coordinator is gone.
    pub fn request(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => false,
            Err(TrySendError::Closed(())) => {
                tracing::debug!("Reload requested after coordinator exit");
                false
            }
        }
    }

    /// Whether both handles feed the same queue.
    pub fn same_queue(&self, other: &ReloadTrigger) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

/// Consumer half of the reload queue.
#[derive(Debug)]
pub struct ReloadEvents {
    rx: mpsc::Receiver<()>,
}

impl ReloadEvents {
    pub async fn recv(&mut self) -> Option<()> {
        self.rx.recv().await
    }
}

/// Create the reload queue. Capacity is one pending request.
pub fn reload_queue() -> (ReloadTrigger, ReloadEvents) {
    let (tx, rx) = mpsc::channel(1);
    (ReloadTrigger { tx }, ReloadEvents { rx })
}

/// Merges termination and reload requests into one stream.
pub struct SignalMultiplexer {
    shutdown: broadcast::Receiver<()>,
    reloads: ReloadEvents,
    terminated: bool,
}

impl SignalMultiplexer {
    pub fn new(shutdown: broadcast::Receiver<()>, reloads: ReloadEvents) -> Self {
        Self {
            shutdown,
            reloads,
            terminated: false,
        }
    }

    /// Wait for the next event.
    ///
    /// Once `Terminate` has been returned every later call returns it again.
    pub async fn next_event(&mut self) -> LifecycleEvent {
        if self.terminated {
            return LifecycleEvent::Terminate;
        }

        tokio::select! {
            biased;
            // Closed or lagged both mean a shutdown can no longer be missed.
            _ = self.shutdown.recv() => {
                self.terminated = true;
                LifecycleEvent::Terminate
            }
            Some(()) = self.reloads.recv() => LifecycleEvent::Reload,
        }
    }
}

/// Install SIGINT/SIGTERM handlers that trigger `shutdown`.
///
/// Registration errors are returned so startup can fail fast.
#[cfg(unix)]
pub fn install_signal_handlers(shutdown: Shutdown) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    Ok(tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                Some(()) = interrupt.recv() => "SIGINT",
                Some(()) = terminate.recv() => "SIGTERM",
                else => break,
            };
            if shutdown.trigger() {
                tracing::info!(signal = name, "Shutdown signal received");
            } else {
                tracing::warn!(signal = name, "Already shutting down");
            }
        }
    }))
}

/// Install a ctrl-c handler that triggers `shutdown`.
#[cfg(not(unix))]
pub fn install_signal_handlers(shutdown: Shutdown) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!(signal = "ctrl-c", "Shutdown signal received");
                shutdown.trigger();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for ctrl-c"),
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_requests_coalesce_in_single_slot() {
        let (trigger, mut events) = reload_queue();
        assert!(trigger.request());
        assert!(!trigger.request());
        assert!(!trigger.clone().request());

        assert!(events.rx.try_recv().is_ok());
        assert!(events.rx.try_recv().is_err());
        assert!(trigger.request());
    }

    #[test]
    fn test_same_queue() {
        let (a, _events_a) = reload_queue();
        let (b, _events_b) = reload_queue();
        assert!(a.same_queue(&a.clone()));
        assert!(!a.same_queue(&b));
    }

    #[test]
    fn test_request_after_consumer_dropped() {
        let (trigger, events) = reload_queue();
        drop(events);
        assert!(!trigger.request());
    }

    #[tokio::test]
    async fn test_reload_event_delivered() {
        let shutdown = Shutdown::new();
        let (trigger, events) = reload_queue();
        let mut mux = SignalMultiplexer::new(shutdown.subscribe(), events);

        trigger.request();
        assert_eq!(mux.next_event().await, LifecycleEvent::Reload);
    }

    #[tokio::test]
    async fn test_terminate_wins_over_queued_reload() {
        let shutdown = Shutdown::new();
        let (trigger, events) = reload_queue();
        let mut mux = SignalMultiplexer::new(shutdown.subscribe(), events);

        trigger.request();
        shutdown.trigger();
        assert_eq!(mux.next_event().await, LifecycleEvent::Terminate);
        // Latched: the queued reload is never surfaced.
        assert_eq!(mux.next_event().await, LifecycleEvent::Terminate);
    }

    #[tokio::test]
    async fn test_waits_until_an_event_arrives() {
        let shutdown = Shutdown::new();
        let (_trigger, events) = reload_queue();
        let mut mux = SignalMultiplexer::new(shutdown.subscribe(), events);

        let pending = tokio::time::timeout(Duration::from_millis(50), mux.next_event()).await;
        assert!(pending.is_err());

        shutdown.trigger();
        assert_eq!(mux.next_event().await, LifecycleEvent::Terminate);
    }
}
