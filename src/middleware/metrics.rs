//! Metrics stage: request counter and duration histogram.

use std::time::Instant;

use axum::extract::Request;
use axum::response::Response;
use futures::future::BoxFuture;

use super::{Interceptor, Next, RequestInfo};
use crate::observability::metrics::RequestInstruments;

/// Counts every request and records its duration, tagged with
/// `{method, route, status}`.
#[derive(Debug, Clone)]
pub struct RequestMetrics {
    instruments: RequestInstruments,
}

impl RequestMetrics {
    pub fn new(instruments: RequestInstruments) -> Self {
        Self { instruments }
    }
}

impl Interceptor for RequestMetrics {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn intercept<'a>(
        &'a self,
        info: &'a RequestInfo,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let start = Instant::now();
            let response = next.run(request).await;

            let record = info.complete(response.status().as_u16(), start.elapsed());
            self.instruments
                .record(&record.metric_attributes(), record.elapsed);
            response
        })
    }
}
