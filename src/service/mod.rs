//! HTTP handlers and router assembly.
//!
//! Routes:
//! - `GET /health`: liveness probe
//! - `GET /api/users`, `GET /api/users/:id`: mock user lookups
//! - `POST /api/process`: simulated processing job

pub mod health;
pub mod process;
pub mod simulator;
pub mod users;

pub use simulator::{Operation, RandomWorkSimulator, ScriptedWorkSimulator, WorkSimulator};

use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use opentelemetry::trace::{TraceContextExt, Tracer as _};
use opentelemetry::{Context, KeyValue};
use serde_json::{json, Value};
use tower_http::catch_panic::CatchPanicLayer;

use crate::middleware::{self, Pipeline};
use crate::observability::Telemetry;

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub telemetry: Telemetry,
    pub simulator: Arc<dyn WorkSimulator>,
}

impl AppState {
    pub fn new(telemetry: Telemetry, simulator: Arc<dyn WorkSimulator>) -> Self {
        Self {
            telemetry,
            simulator,
        }
    }

    /// Start a child span of `parent`; it ends when the guard is dropped.
    pub fn child_span(&self, name: &'static str, parent: &Context) -> HandlerSpan {
        let span = self.telemetry.tracer().start_with_context(name, parent);
        HandlerSpan {
            cx: parent.with_span(span),
        }
    }
}

/// Handler or operation span, ended on every exit path.
pub struct HandlerSpan {
    cx: Context,
}

impl HandlerSpan {
    /// Context to parent nested operations on.
    pub fn context(&self) -> &Context {
        &self.cx
    }

    pub fn set_attribute(&self, attribute: KeyValue) {
        self.cx.span().set_attribute(attribute);
    }
}

impl Drop for HandlerSpan {
    fn drop(&mut self) {
        self.cx.span().end();
    }
}

/// Server span context installed by the tracing stage, if any.
pub(crate) fn request_context(parent: Option<Extension<Context>>) -> Context {
    parent.map_or_else(Context::current, |Extension(cx)| cx)
}

/// JSON error body: `{"error": message}`.
pub(crate) fn error_body(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message })))
}

async fn not_found() -> (StatusCode, Json<Value>) {
    error_body(StatusCode::NOT_FOUND, "Not found")
}

/// Build the application router.
pub fn router(telemetry: Telemetry, simulator: Arc<dyn WorkSimulator>) -> Router {
    let routes = Router::new()
        .route("/health", get(health::health))
        .route("/api/users", get(users::list_users))
        .route("/api/users/:id", get(users::get_user))
        .route("/api/process", post(process::process))
        .fallback(not_found);

    let instrumented = instrument(routes, &telemetry);
    instrumented.with_state(AppState::new(telemetry, simulator))
}

/// Wrap `routes` in panic recovery and the telemetry pipeline.
///
/// The pipeline is the outermost layer; panics are caught inside it so a
/// crashing handler still gets a log line, metrics and an ended span.
fn instrument(routes: Router<AppState>, telemetry: &Telemetry) -> Router<AppState> {
    let pipeline = Arc::new(Pipeline::for_telemetry(telemetry));
    routes
        .layer(CatchPanicLayer::new())
        .layer(axum::middleware::from_fn_with_state(
            pipeline,
            middleware::intercept,
        ))
}


#[cfg(test)]
mod tests {
    use super::test_support::TestApp;
    use super::*;
    use crate::observability::ServiceIdentity;
    use axum::body::Body;
    use axum::extract::Request;
    use axum::http::Method;
    use opentelemetry::trace::{SpanKind, Status};
    use opentelemetry_sdk::metrics::data::Sum;
    use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
    use opentelemetry_sdk::runtime;
    use opentelemetry_sdk::testing::metrics::InMemoryMetricsExporter;
    use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
    use opentelemetry_sdk::trace::TracerProvider;
    use std::time::Duration;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_unknown_route_is_json_404() {
        let app = TestApp::new(ScriptedWorkSimulator::instant());
        let (status, body) = app.send(Method::GET, "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "Not found" }));

        // Unmatched requests are still traced, under a bounded label.
        let spans = app.finished_spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, middleware::UNMATCHED_ROUTE);
    }

    #[tokio::test]
    async fn test_handler_spans_are_children_of_server_span() {
        let app = TestApp::new(ScriptedWorkSimulator::instant());
        let (status, _) = app.send(Method::GET, "/api/users").await;
        assert_eq!(status, StatusCode::OK);

        let server = app.span("/api/users");
        let handler = app.span("getUsersHandler");
        let fetch = app.span("fetchUsers");

        assert_eq!(server.span_kind, SpanKind::Server);
        assert_eq!(handler.parent_span_id, server.span_context.span_id());
        assert_eq!(fetch.parent_span_id, handler.span_context.span_id());
        assert_eq!(
            fetch.span_context.trace_id(),
            server.span_context.trace_id()
        );
    }

    async fn crash() -> &'static str {
        panic!("handler crashed")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_handler_panic_is_recorded_as_server_error() {
        let spans = InMemorySpanExporter::default();
        let tracer_provider = TracerProvider::builder()
            .with_simple_exporter(spans.clone())
            .build();
        let metrics = InMemoryMetricsExporter::default();
        let reader = PeriodicReader::builder(metrics.clone(), runtime::Tokio)
            .with_interval(Duration::from_secs(3600))
            .build();
        let meter_provider = SdkMeterProvider::builder().with_reader(reader).build();
        let (telemetry, shutdown) = Telemetry::install(
            ServiceIdentity::new("backend", "test", "test"),
            tracer_provider,
            meter_provider,
        );

        let routes = Router::new().route("/crash/:id", get(crash));
        let app = instrument(routes, &telemetry)
            .with_state(AppState::new(telemetry, Arc::new(ScriptedWorkSimulator::instant())));

        let request = Request::builder()
            .uri("/crash/7")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let finished = spans.get_finished_spans().unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].name, "/crash/:id");
        assert_eq!(finished[0].span_kind, SpanKind::Server);
        assert!(matches!(finished[0].status, Status::Error { .. }));

        shutdown.flush().await.unwrap();
        let exported = metrics.get_finished_metrics().unwrap();
        let latest = exported.last().expect("metrics exported");
        let requests = latest
            .scope_metrics
            .iter()
            .flat_map(|scope| &scope.metrics)
            .find(|metric| metric.name == crate::observability::metrics::REQUESTS_METRIC)
            .expect("request counter exported");
        let sum = requests
            .data
            .as_any()
            .downcast_ref::<Sum<u64>>()
            .expect("request counter is a u64 sum");

        assert_eq!(sum.data_points.len(), 1);
        let point = &sum.data_points[0];
        assert_eq!(point.value, 1);
        let label = |key: &str| {
            point
                .attributes
                .iter()
                .find(|kv| kv.key.as_str() == key)
                .map(|kv| kv.value.as_str().into_owned())
        };
        assert_eq!(label("method").as_deref(), Some("GET"));
        assert_eq!(label("route").as_deref(), Some("/crash/:id"));
        assert_eq!(label("status").as_deref(), Some("500"));

        shutdown.shutdown().await.unwrap();
    }
}
