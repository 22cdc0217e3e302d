//! Per-inbound traffic hooks.
//!
//! # Responsibilities
//! - Count connections (total and active) for one inbound
//! - Accumulate bytes in both directions
//! - Mirror the counters into metrics, labelled by inbound tag

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::observability::metrics;

/// Point-in-time copy of an inbound's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficStats {
    pub connections_total: u64,
    pub active_connections: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// Traffic counters shared between a controller and the engine.
#[derive(Debug)]
pub struct TrafficHooks {
    tag: String,
    connections_total: AtomicU64,
    active_connections: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
}

impl TrafficHooks {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            connections_total: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            bytes_in: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Record a new connection. Returns a guard that decrements on drop.
    pub fn connection_opened(self: &Arc<Self>) -> ConnectionGuard {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        let active = self.active_connections.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::record_connection(&self.tag, active);
        ConnectionGuard {
            hooks: Arc::clone(self),
        }
    }

    /// Record bytes received from and sent to a client.
    pub fn record_traffic(&self, bytes_in: u64, bytes_out: u64) {
        self.bytes_in.fetch_add(bytes_in, Ordering::Relaxed);
        self.bytes_out.fetch_add(bytes_out, Ordering::Relaxed);
        metrics::record_traffic(&self.tag, bytes_in, bytes_out);
    }

    pub fn stats(&self) -> TrafficStats {
        TrafficStats {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
        }
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements the active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    hooks: Arc<TrafficHooks>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let active = self.hooks.active_connections.fetch_sub(1, Ordering::Relaxed) - 1;
        metrics::record_connection(&self.hooks.tag, active);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_guard_tracks_active() {
        let hooks = Arc::new(TrafficHooks::new("vmess_10002"));
        let first = hooks.connection_opened();
        let second = hooks.connection_opened();
        assert_eq!(hooks.stats().active_connections, 2);

        drop(first);
        assert_eq!(hooks.stats().active_connections, 1);
        drop(second);

        let stats = hooks.stats();
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.connections_total, 2);
    }

    #[test]
    fn test_record_traffic_accumulates() {
        let hooks = TrafficHooks::new("trojan_443");
        hooks.record_traffic(10, 20);
        hooks.record_traffic(5, 0);
        let stats = hooks.stats();
        assert_eq!(stats.bytes_in, 15);
        assert_eq!(stats.bytes_out, 20);
    }
}
