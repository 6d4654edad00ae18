//! W3C trace context propagation.
//!
//! Incoming `traceparent`/`tracestate` and `baggage` headers are extracted so
//! that server spans join the caller's trace.

use axum::http::HeaderMap;
use opentelemetry::propagation::{Extractor, TextMapCompositePropagator, TextMapPropagator};
use opentelemetry::Context;
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};

/// TraceContext + Baggage, in that order.
pub fn composite_propagator() -> TextMapCompositePropagator {
    TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ])
}

/// Read-only view of HTTP headers for the propagator.
pub struct HeaderExtractor<'a>(pub &'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|name| name.as_str()).collect()
    }
}

/// Parent context carried by the request headers, or an empty context.
pub fn extract_parent(propagator: &TextMapCompositePropagator, headers: &HeaderMap) -> Context {
    propagator.extract(&HeaderExtractor(headers))
}
