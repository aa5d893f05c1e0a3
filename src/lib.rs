//! Graceful-shutdown orchestration for long-running network servers.

pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::schema::ServerConfig;
pub use health::{HealthReporter, HealthStatus};
pub use http::HttpServer;
pub use lifecycle::{ShutdownOrchestrator, ShutdownOutcome, ShutdownReport, ShutdownState};
