//! Health check endpoints.
//!
//! # Responses
//! - `200 {"status":"SERVING"}`
//! - `503 {"status":"NOT_SERVING"}` (or UNKNOWN for a registered but unset service)
//! - `404 {"status":"UNKNOWN"}` for services never registered

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::health::HealthStatus;
use crate::http::AppState;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: HealthStatus,
}

pub async fn overall(State(state): State<AppState>) -> Response {
    respond(Some(state.health.overall()))
}

pub async fn service(State(state): State<AppState>, Path(service): Path<String>) -> Response {
    let status = state.health.status(&service);
    tracing::debug!(service = %service, status = ?status, "Health check");
    respond(status)
}

fn respond(status: Option<HealthStatus>) -> Response {
    let (code, status) = match status {
        Some(HealthStatus::Serving) => (StatusCode::OK, HealthStatus::Serving),
        Some(other) => (StatusCode::SERVICE_UNAVAILABLE, other),
        None => (StatusCode::NOT_FOUND, HealthStatus::Unknown),
    };
    (code, Json(HealthCheckResponse { status })).into_response()
}
