//! Metrics collection and exposition.
//!
//! # Metrics
//! - `node_reloads_total` (counter): reload cycles by outcome
//! - `node_active_controllers` (gauge): controllers in the active pair
//! - `node_inbound_active_connections` (gauge): open connections per inbound
//! - `node_inbound_bytes_total` (counter): bytes per inbound and direction

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_reload(outcome: &'static str) {
    ::metrics::counter!("node_reloads_total", "outcome" => outcome).increment(1);
}

pub fn record_active_controllers(count: usize) {
    ::metrics::gauge!("node_active_controllers").set(count as f64);
}

pub fn record_connection(inbound: &str, active: u64) {
    ::metrics::gauge!("node_inbound_active_connections", "inbound" => inbound.to_string())
        .set(active as f64);
}

pub fn record_traffic(inbound: &str, bytes_in: u64, bytes_out: u64) {
    ::metrics::counter!(
        "node_inbound_bytes_total",
        "inbound" => inbound.to_string(),
        "direction" => "in"
    )
    .increment(bytes_in);
    ::metrics::counter!(
        "node_inbound_bytes_total",
        "inbound" => inbound.to_string(),
        "direction" => "out"
    )
    .increment(bytes_out);
}
