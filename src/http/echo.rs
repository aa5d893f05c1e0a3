//! Echo handler.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::http::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoResponse {
    pub content: String,
}

/// Return the request content, tagging the response with the serving host.
pub async fn echo(State(state): State<AppState>, Json(request): Json<EchoRequest>) -> impl IntoResponse {
    tracing::info!(content_len = request.content.len(), "Handling echo request");
    (
        [("hostname", state.hostname.to_string())],
        Json(EchoResponse {
            content: request.content,
        }),
    )
}

/// Host name reported in the `hostname` header, empty if unavailable.
pub fn resolve_hostname() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.trim().is_empty() {
            return name.trim().to_string();
        }
    }
    match std::fs::read_to_string("/proc/sys/kernel/hostname") {
        Ok(name) => name.trim().to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "Unable to get hostname");
            String::new()
        }
    }
}
