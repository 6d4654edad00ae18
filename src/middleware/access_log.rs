//! Access log stage: one structured line per handled request.

use std::time::Instant;

use axum::extract::Request;
use axum::response::Response;
use futures::future::BoxFuture;

use super::{Interceptor, Next, RequestInfo, RequestTelemetryRecord};

/// Emits `HTTP request` with method, path, status, duration and client.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessLog;

impl AccessLog {
    fn emit(record: &RequestTelemetryRecord) {
        tracing::info!(
            method = %record.method,
            path = %record.path,
            route = %record.route,
            status = record.status,
            duration_ms = record.duration_ms(),
            client_ip = %record.client_addr,
            "HTTP request"
        );
    }
}

impl Interceptor for AccessLog {
    fn name(&self) -> &'static str {
        "access_log"
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
            Self::emit(&info.complete(response.status().as_u16(), start.elapsed()));
            response
        })
    }
}
