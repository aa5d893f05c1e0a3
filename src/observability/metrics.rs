//! Metrics collection and exposition.
//!
//! # Metrics
//! - `health_status` (gauge, by service): 1=serving, 0=not serving, -1=unknown
//! - `active_connections` (gauge): connections currently open
//! - `shutdown_total` (counter, by outcome): drained or forced
//! - `shutdown_abandoned_connections` (gauge): connections cut by a forced stop
//! - `shutdown_duration_seconds` (histogram): signal to termination

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::health::HealthStatus;
use crate::lifecycle::ShutdownOutcome;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint started");
    Ok(())
}

pub fn record_health_status(service: &str, status: HealthStatus) {
    gauge!("health_status", "service" => service.to_string()).set(status.as_gauge());
}

pub fn record_connection_opened() {
    gauge!("active_connections").increment(1.0);
}

pub fn record_connection_closed() {
    gauge!("active_connections").decrement(1.0);
}

pub fn record_shutdown(outcome: &ShutdownOutcome, elapsed: Duration) {
    counter!("shutdown_total", "outcome" => outcome.label()).increment(1);
    if let ShutdownOutcome::Forced { abandoned } = outcome {
        gauge!("shutdown_abandoned_connections").set(*abandoned as f64);
    }
    histogram!("shutdown_duration_seconds").record(elapsed.as_secs_f64());
}
