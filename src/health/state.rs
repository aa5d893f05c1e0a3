//! Serving status of a named service.
//!
//! # States
//! - Unknown: registered but never reported, or never registered at all
//! - Serving: accepts new traffic
//! - NotServing: routers should stop sending new traffic
//!
//! # State Transitions
//! ```text
//! Unknown → Serving      (startup)
//! Serving → NotServing   (shutdown, exactly once)
//! ```

use serde::{Deserialize, Serialize};

/// Health of a single service as seen by external probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    #[default]
    Unknown,
    Serving,
    NotServing,
}

impl HealthStatus {
    pub fn is_serving(self) -> bool {
        self == HealthStatus::Serving
    }

    /// Gauge value exported to metrics (1 serving, 0 not serving, -1 unknown).
    pub fn as_gauge(self) -> f64 {
        match self {
            HealthStatus::Serving => 1.0,
            HealthStatus::NotServing => 0.0,
            HealthStatus::Unknown => -1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Unknown => "UNKNOWN",
            HealthStatus::Serving => "SERVING",
            HealthStatus::NotServing => "NOT_SERVING",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
