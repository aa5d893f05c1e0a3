//! Concurrent health status table.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use tokio::sync::watch;

use crate::health::state::HealthStatus;
use crate::observability::metrics;

/// Service name used for the status of the whole server.
pub const OVERALL: &str = "";

/// Table of per-service health, shared by the orchestrator and probes.
///
/// Writes go through a `watch` channel per service, so any reader on
/// another task sees the latest completed `set_status` without locking.
#[derive(Debug)]
pub struct HealthReporter {
    services: DashMap<String, watch::Sender<HealthStatus>>,
    shutting_down: AtomicBool,
}

impl HealthReporter {
    /// Create a reporter with the overall server status set to SERVING.
    pub fn new() -> Self {
        let reporter = Self {
            services: DashMap::new(),
            shutting_down: AtomicBool::new(false),
        };
        reporter.set_status(OVERALL, HealthStatus::Serving);
        reporter
    }

    /// Overwrite the status of `name`, registering it if needed.
    ///
    /// Once [`shutdown`](Self::shutdown) has run, SERVING updates are
    /// dropped so the status cannot flip back.
    pub fn set_status(&self, name: &str, status: HealthStatus) {
        let mut previous = status;
        let mut rejected = false;
        // The latch is read under the channel's lock, so a SERVING write
        // racing `shutdown` cannot land after its NOT_SERVING write.
        let mut apply = |tx: &watch::Sender<HealthStatus>| {
            tx.send_if_modified(|current| {
                if status.is_serving() && self.shutting_down.load(Ordering::SeqCst) {
                    rejected = true;
                    return false;
                }
                previous = std::mem::replace(current, status);
                previous != status
            });
        };

        match self.services.get(name) {
            Some(tx) => apply(tx.value()),
            None => apply(
                self.services
                    .entry(name.to_string())
                    .or_insert_with(|| watch::channel(HealthStatus::Unknown).0)
                    .value(),
            ),
        }

        if rejected {
            tracing::debug!(service = %name, "Ignoring SERVING update after shutdown");
            return;
        }

        if previous != status {
            tracing::info!(
                service = %name,
                from = %previous,
                to = %status,
                "Health status changed"
            );
        }
        metrics::record_health_status(name, status);
    }

    /// Current status of `name`, or `None` if it was never registered.
    pub fn status(&self, name: &str) -> Option<HealthStatus> {
        self.services.get(name).map(|tx| *tx.borrow())
    }

    /// Status of the server as a whole.
    pub fn overall(&self) -> HealthStatus {
        self.status(OVERALL).unwrap_or_default()
    }

    /// Watch status changes of `name`. Registers it as UNKNOWN if absent.
    pub fn subscribe(&self, name: &str) -> watch::Receiver<HealthStatus> {
        self.services
            .entry(name.to_string())
            .or_insert_with(|| watch::channel(HealthStatus::Unknown).0)
            .subscribe()
    }

    /// Names of every registered service, including the overall entry.
    pub fn service_names(&self) -> Vec<String> {
        self.services.iter().map(|e| e.key().clone()).collect()
    }

    /// Mark every registered service NOT_SERVING and refuse later SERVING writes.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        for name in self.service_names() {
            self.set_status(&name, HealthStatus::NotServing);
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}

impl Default for HealthReporter {
    fn default() -> Self {
        Self::new()
    }
}
