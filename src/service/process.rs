//! Simulated processing job.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use opentelemetry::{Context, KeyValue};
use serde::Serialize;

use super::simulator::Operation;
use super::{error_body, request_context, AppState};

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResponse {
    pub message: &'static str,
    pub status: &'static str,
}

/// `POST /api/process`
///
/// Fails with `500 {"error":"Processing failed"}` when the simulator says
/// so; the handler span then carries `error=true`.
pub async fn process(
    State(state): State<AppState>,
    parent: Option<Extension<Context>>,
) -> Response {
    let parent = request_context(parent);
    let span = state.child_span("processHandler", &parent);

    state.simulator.simulate(Operation::Process).await;

    if state.simulator.should_fail(Operation::Process) {
        span.set_attribute(KeyValue::new("error", true));
        tracing::warn!("Simulated processing failure");
        return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Processing failed").into_response();
    }

    Json(ProcessResponse {
        message: "Processing completed",
        status: "success",
    })
    .into_response()
}
