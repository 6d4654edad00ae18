//! Request telemetry middleware.
//!
//! Middleware is an explicit, ordered [`Pipeline`] of [`Interceptor`]
//! stages. The first stage is the outermost: it sees the request first and
//! the response last. Each stage gets the request metadata, the request and a
//! [`Next`] continuation that runs the remaining stages and the handler.
//!
//! ```text
//! request → AccessLog → RequestMetrics → RequestTracing → handler
//! response ←    log    ←    count/time  ←    end span    ←
//! ```

pub mod access_log;
pub mod metrics;
pub mod request;
pub mod tracing;

pub use access_log::AccessLog;
pub use metrics::RequestMetrics;
pub use request::{RequestInfo, RequestTelemetryRecord, UNMATCHED_ROUTE};
pub use tracing::RequestTracing;

use std::future::Future;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::response::Response;
use futures::future::BoxFuture;

use crate::observability::Telemetry;

/// Terminal step of the pipeline: the wrapped handler.
pub type Endpoint<'a> = Box<dyn FnOnce(Request) -> BoxFuture<'a, Response> + Send + 'a>;

/// One stage of the request pipeline.
pub trait Interceptor: Send + Sync {
    /// Stage name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Handle a request, calling `next.run(request)` exactly once to
    /// continue down the pipeline.
    fn intercept<'a>(
        &'a self,
        info: &'a RequestInfo,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response>;
}

/// Continuation handed to an interceptor: the rest of the pipeline.
pub struct Next<'a> {
    info: &'a RequestInfo,
    stages: &'a [Arc<dyn Interceptor>],
    endpoint: Endpoint<'a>,
}

impl<'a> Next<'a> {
    /// Run the remaining stages and then the handler.
    pub fn run(self, request: Request) -> BoxFuture<'a, Response> {
        match self.stages.split_first() {
            Some((stage, rest)) => stage.intercept(
                self.info,
                request,
                Next {
                    info: self.info,
                    stages: rest,
                    endpoint: self.endpoint,
                },
            ),
            None => (self.endpoint)(request),
        }
    }
}

/// Ordered list of interceptors.
#[derive(Default, Clone)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Interceptor>>,
}

impl Pipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage; it runs inside every stage added before it.
    #[must_use]
    pub fn with(mut self, stage: impl Interceptor + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Access log, then metrics, then tracing around the handler.
    pub fn for_telemetry(telemetry: &Telemetry) -> Self {
        Self::new()
            .with(AccessLog)
            .with(RequestMetrics::new(telemetry.instruments().clone()))
            .with(RequestTracing::new(telemetry.clone()))
    }

    /// Stage names, outermost first.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Run a request through all stages with explicit metadata.
    pub async fn handle_with<'a, F, Fut>(
        &'a self,
        info: &'a RequestInfo,
        request: Request,
        endpoint: F,
    ) -> Response
    where
        F: FnOnce(Request) -> Fut + Send + 'a,
        Fut: Future<Output = Response> + Send + 'a,
    {
        let endpoint: Endpoint<'a> =
            Box::new(move |request| -> BoxFuture<'a, Response> { Box::pin(endpoint(request)) });
        Next {
            info,
            stages: &self.stages,
            endpoint,
        }
        .run(request)
        .await
    }

    /// Run a request through all stages, deriving metadata from the request.
    pub async fn handle<F, Fut>(&self, request: Request, endpoint: F) -> Response
    where
        F: FnOnce(Request) -> Fut + Send,
        Fut: Future<Output = Response> + Send,
    {
        let info = RequestInfo::from_request(&request);
        self.handle_with(&info, request, endpoint).await
    }
}

/// axum adapter; install with
/// `axum::middleware::from_fn_with_state(pipeline, middleware::intercept)`
/// through `Router::layer` so the matched route is known.
pub async fn intercept(
    State(pipeline): State<Arc<Pipeline>>,
    request: Request,
    next: axum::middleware::Next,
) -> Response {
    pipeline.handle(request, move |request| next.run(request)).await
}
