//! Health probe for graceful-server.
//!
//! Exits 0 when the queried service reports SERVING and 1 otherwise, so it
//! can back container liveness/readiness checks.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use graceful_server::http::health::HealthCheckResponse;

#[derive(Parser)]
#[command(name = "health-probe")]
#[command(about = "Query the health endpoint of a graceful-server instance", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8090")]
    url: String,

    /// Service name to check; omit for overall server health.
    #[arg(short, long)]
    service: Option<String>,

    #[arg(short, long, default_value_t = 1)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match probe(&cli).await {
        Ok(response) => {
            println!("status: {}", response.status);
            if response.status.is_serving() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("error: health check failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn probe(cli: &Cli) -> Result<HealthCheckResponse, reqwest::Error> {
    let base = cli.url.trim_end_matches('/');
    let url = match &cli.service {
        Some(service) => format!("{}/health/{}", base, service),
        None => format!("{}/health", base),
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(cli.timeout_secs))
        .build()?;

    // Non-2xx responses still carry a status body.
    client.get(url).send().await?.json().await
}
