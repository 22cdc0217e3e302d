//! Termination request shared by signal handlers and the event loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

/// Latched termination request.
///
/// The first `trigger` wakes every subscriber; later calls are no-ops.
/// Clones share the latch.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    requested: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Receiver that resolves once termination is requested.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Request termination. Returns `true` only for the first request.
    pub fn trigger(&self) -> bool {
        if self.requested.swap(true, Ordering::SeqCst) {
            return false;
        }
        let _ = self.tx.send(());
        true
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
