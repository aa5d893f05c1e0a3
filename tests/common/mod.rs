//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Path;
use axum::routing::get;
use graceful_server::config::ListenerConfig;
use graceful_server::http::{self, AppState, HttpServer, ServerHandle};
use graceful_server::net::Listener;
use graceful_server::{HealthReporter, HealthStatus, ShutdownOrchestrator};

pub const SERVICE: &str = "grpc.health.v1.echo";

/// A running engine plus the orchestrator that will stop it.
pub struct TestServer {
    pub addr: SocketAddr,
    pub health: Arc<HealthReporter>,
    pub orchestrator: ShutdownOrchestrator<ServerHandle>,
}

impl TestServer {
    /// Start the production routes plus `/sleep/{ms}` on an ephemeral port.
    pub async fn start(grace_period: Duration) -> Self {
        let config = ListenerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            ..ListenerConfig::default()
        };
        let listener = Listener::bind(&config).await.unwrap();

        let health = Arc::new(HealthReporter::new());
        let router = http::app(AppState::new(Arc::clone(&health))).route("/sleep/{ms}", get(sleep));
        let handle = HttpServer::new(router, &config).spawn(listener).unwrap();
        health.set_status(SERVICE, HealthStatus::Serving);

        let addr = handle.local_addr();
        let orchestrator = ShutdownOrchestrator::new(Arc::clone(&health), handle)
            .with_service_names(vec![SERVICE.to_string()])
            .with_grace_period(grace_period)
            .with_force_stop_timeout(Duration::from_secs(2));

        Self {
            addr,
            health,
            orchestrator,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

async fn sleep(Path(ms): Path<u64>) -> String {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    format!("slept {}", ms)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
