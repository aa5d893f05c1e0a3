//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (net::Listener)
//!     → server.rs (hyper auto HTTP/1 + HTTP/2, drain control)
//!     → middleware (request ID, tracing, timeout)
//!     → echo.rs   POST /echo
//!     → health.rs GET  /health, /health/{service}
//! ```

pub mod echo;
pub mod health;
pub mod server;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::health::HealthReporter;

pub use server::{HttpServer, ServerHandle};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub health: Arc<HealthReporter>,
    pub hostname: Arc<str>,
}

impl AppState {
    pub fn new(health: Arc<HealthReporter>) -> Self {
        Self {
            health,
            hostname: echo::resolve_hostname().into(),
        }
    }
}

/// Routes served by the binary: echo plus health checks.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/echo", post(echo::echo))
        .route("/health", get(health::overall))
        .route("/health/{service}", get(health::service))
        .with_state(state)
}
