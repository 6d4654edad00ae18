//! Liveness probe.

use axum::extract::State;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use super::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    /// RFC 3339, second precision.
    pub time: String,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: state.telemetry.identity().name().to_string(),
        time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    })
}
