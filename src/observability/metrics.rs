//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_requests_total` (counter, label `outcome`): acknowledged, timeout, failed, bad_request, not_connected
//! - `bridge_ack_latency_seconds` (histogram): dispatch to receipt
//! - `bridge_pending_acks` (gauge): receipts currently awaited
//! - `broker_connection_state` (gauge): 0 disconnected, 1 connecting, 2 connected, 3 errored
//! - `broker_reconnects_total` (counter)
//!
//! Without an installed recorder every call below is a no-op.

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const REQUESTS_TOTAL: &str = "bridge_requests_total";
pub const ACK_LATENCY_SECONDS: &str = "bridge_ack_latency_seconds";
pub const PENDING_ACKS: &str = "bridge_pending_acks";
pub const BROKER_CONNECTION_STATE: &str = "broker_connection_state";
pub const BROKER_RECONNECTS_TOTAL: &str = "broker_reconnects_total";

/// Install the Prometheus recorder with its own scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(outcome: &'static str) {
    metrics::counter!(REQUESTS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_ack_latency(elapsed: Duration) {
    metrics::histogram!(ACK_LATENCY_SECONDS).record(elapsed.as_secs_f64());
}

pub fn record_pending(count: usize) {
    metrics::gauge!(PENDING_ACKS).set(count as f64);
}

pub fn record_broker_state(value: f64) {
    metrics::gauge!(BROKER_CONNECTION_STATE).set(value);
}

pub fn record_broker_reconnect() {
    metrics::counter!(BROKER_RECONNECTS_TOTAL).increment(1);
}
