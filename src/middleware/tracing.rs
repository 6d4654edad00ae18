//! Tracing stage: one server span per request.

use axum::extract::Request;
use axum::response::Response;
use futures::future::BoxFuture;
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer as _};
use opentelemetry::{Context, KeyValue};

use super::{Interceptor, Next, RequestInfo};
use crate::observability::propagation::extract_parent;
use crate::observability::Telemetry;

/// Starts a `Server` span named after the route template, continues the
/// caller's trace when `traceparent` is present, and ends the span once the
/// inner stages return.
///
/// The span's [`Context`] is inserted into the request extensions so
/// handlers can open child spans. If the request future is dropped before
/// completion the span is ended when its last context is dropped.
#[derive(Clone)]
pub struct RequestTracing {
    telemetry: Telemetry,
}

impl RequestTracing {
    pub fn new(telemetry: Telemetry) -> Self {
        Self { telemetry }
    }

    fn start(&self, info: &RequestInfo, request: &Request) -> Context {
        let parent = extract_parent(self.telemetry.propagator(), request.headers());
        let tracer = self.telemetry.tracer();

        let span = tracer
            .span_builder(info.route.clone())
            .with_kind(SpanKind::Server)
            .with_attributes([
                KeyValue::new("http.method", info.method.as_str().to_string()),
                KeyValue::new("http.route", info.route.clone()),
            ])
            .start_with_context(tracer, &parent);

        parent.with_span(span)
    }

    fn finish(cx: &Context, status: u16) {
        let span = cx.span();
        span.set_attribute(KeyValue::new("http.status_code", i64::from(status)));
        if status >= 500 {
            span.set_status(Status::error(format!("HTTP {status}")));
        }
        span.end();
    }
}

impl Interceptor for RequestTracing {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn intercept<'a>(
        &'a self,
        info: &'a RequestInfo,
        mut request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let cx = self.start(info, &request);
            request.extensions_mut().insert(cx.clone());

            let response = next.run(request).await;
            Self::finish(&cx, response.status().as_u16());
            response
        })
    }
}
