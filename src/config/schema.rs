//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::lifecycle::signals::SignalKind;

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, limits).
    pub listener: ListenerConfig,

    /// Graceful shutdown settings.
    pub shutdown: ShutdownConfig,

    /// Services reported through the health endpoint.
    pub health: HealthConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8090").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8090".to_string(),
            max_connections: 10_000,
            request_timeout_secs: 30,
        }
    }
}

/// Graceful shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Maximum time in-flight work may take to drain before a forced stop.
    pub grace_period_secs: u64,

    /// How long to wait for the engine to release resources after a forced stop.
    pub force_stop_timeout_secs: u64,

    /// Signals that trigger shutdown.
    pub signals: Vec<SignalKind>,
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn force_stop_timeout(&self) -> Duration {
        Duration::from_secs(self.force_stop_timeout_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 5,
            force_stop_timeout_secs: 2,
            signals: vec![SignalKind::Interrupt, SignalKind::Terminate],
        }
    }
}

/// Health reporting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Service names marked SERVING at startup and NOT_SERVING at shutdown.
    pub service_names: Vec<String>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            service_names: vec!["grpc.health.v1.echo".to_string()],
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
