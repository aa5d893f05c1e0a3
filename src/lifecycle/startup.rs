//! Startup orchestration.
//!
//! # Responsibilities
//! - Register termination signal handlers
//! - Start the metrics exporter when enabled
//! - Bind the listener and spawn the serving engine
//! - Mark configured services SERVING
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Signals are registered before the port is bound, so a server that
//!   cannot be stopped never accepts traffic
//! - Health flips to SERVING last (traffic only when ready)

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::health::{HealthReporter, HealthStatus};
use crate::http::{self, AppState, HttpServer, ServerHandle};
use crate::lifecycle::shutdown::{ShutdownOrchestrator, ShutdownReport};
use crate::lifecycle::signals::{ShutdownSignal, SignalError, SignalListener};
use crate::net::{Listener, ListenerError};
use crate::observability::metrics;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("cannot listen for termination signals: {0}")]
    Signals(#[from] SignalError),
    #[error("cannot start serving: {0}")]
    Listener(#[from] ListenerError),
    #[error("cannot start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
    #[error("invalid metrics address `{0}`")]
    MetricsAddress(String),
}

/// A server that is accepting traffic and waiting to be shut down.
#[derive(Debug)]
pub struct RunningServer {
    config: ServerConfig,
    health: Arc<HealthReporter>,
    handle: ServerHandle,
    signals: SignalListener,
}

/// Bring the server up according to `config`.
pub async fn start(config: ServerConfig) -> Result<RunningServer, StartupError> {
    let signals = SignalListener::new(&config.shutdown.signals)?;

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr)?;
    }

    let health = Arc::new(HealthReporter::new());
    let listener = Listener::bind(&config.listener).await?;
    let router = http::app(AppState::new(Arc::clone(&health)));
    let handle = HttpServer::new(router, &config.listener).spawn(listener)?;

    for name in &config.health.service_names {
        health.set_status(name, HealthStatus::Serving);
    }

    tracing::info!(
        address = %handle.local_addr(),
        services = ?config.health.service_names,
        signals = ?signals.kinds(),
        grace_period_secs = config.shutdown.grace_period_secs,
        "Server ready"
    );

    Ok(RunningServer {
        config,
        health,
        handle,
        signals,
    })
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.handle.local_addr()
    }

    pub fn health(&self) -> &Arc<HealthReporter> {
        &self.health
    }

    /// Serve until a termination signal arrives, then shut down.
    pub async fn run_until_signal(self) -> ShutdownReport {
        let RunningServer {
            config,
            health,
            handle,
            signals,
        } = self;
        ShutdownOrchestrator::from_config(health, handle, &config)
            .run(signals.wait_for_termination())
            .await
    }

    /// Serve until `trigger` resolves or a termination signal arrives,
    /// whichever comes first.
    pub async fn run_until<F>(self, trigger: F) -> ShutdownReport
    where
        F: Future<Output = ShutdownSignal>,
    {
        let RunningServer {
            config,
            health,
            handle,
            signals,
        } = self;
        ShutdownOrchestrator::from_config(health, handle, &config)
            .run(signals.wait_for_termination_or(trigger))
            .await
    }
}
