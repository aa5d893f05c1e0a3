//! graceful-server
//!
//! Echo server with a health endpoint that drains in-flight requests on
//! SIGINT/SIGTERM before exiting.
//!
//! ```text
//!   signal ──▶ orchestrator ──▶ health: NOT_SERVING
//!                    │
//!                    ├──▶ engine: begin graceful stop ──▶ drained ──┐
//!                    │                                              ├──▶ exit 0
//!                    └──▶ grace period elapsed ──▶ force stop ──────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use graceful_server::config::{loader, Overrides};
use graceful_server::lifecycle;
use graceful_server::observability::logging;

#[derive(Parser)]
#[command(name = "graceful-server")]
#[command(about = "Echo server with graceful shutdown", long_about = None)]
struct Cli {
    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listener port; overrides the PORT environment variable.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let overrides = Overrides::from_env()?.merge(Overrides { port: cli.port });
    let config = loader::resolve(cli.config.as_deref(), &overrides)?;

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "graceful-server starting");

    let server = lifecycle::start(config).await?;
    let report = server.run_until_signal().await;

    tracing::info!(
        outcome = report.outcome.label(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Shutdown complete"
    );
    Ok(())
}
