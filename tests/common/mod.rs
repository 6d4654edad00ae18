//! Test utilities and server harness for backend integration tests.
//!
//! Provides:
//! - An in-process server on `127.0.0.1:0` wired to in-memory exporters
//! - An HTTP client bound to that server
//! - Helpers to read exported spans and request metrics

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::trace::SpanKind;
use opentelemetry::KeyValue;
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::metrics::data::{Histogram, Sum};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::testing::metrics::InMemoryMetricsExporter;
use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
use opentelemetry_sdk::trace::TracerProvider;
use tokio::sync::watch;

use backend::observability::{ServiceIdentity, Telemetry, TelemetryShutdown};
use backend::server::{self, HttpServer, ServerError};
use backend::service::{self, ScriptedWorkSimulator, WorkSimulator};

/// `{method, route, status}` of one metric data point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Labels {
    pub method: String,
    pub route: String,
    pub status: String,
}

impl Labels {
    fn from_attributes(attributes: &[KeyValue]) -> Self {
        let get = |key: &str| {
            attributes
                .iter()
                .find(|kv| kv.key.as_str() == key)
                .map(|kv| kv.value.as_str().into_owned())
                .unwrap_or_default()
        };
        Self {
            method: get("method"),
            route: get("route"),
            status: get("status"),
        }
    }
}

/// Cumulative request metrics at the last flush.
#[derive(Debug, Default)]
pub struct RequestMetricsSnapshot {
    /// `http.server.requests` value per label set.
    pub requests: Vec<(Labels, u64)>,
    /// `http.server.duration` observation count per label set.
    pub durations: Vec<(Labels, u64)>,
}

impl RequestMetricsSnapshot {
    pub fn requests_for(&self, route: &str) -> u64 {
        self.requests
            .iter()
            .filter(|(labels, _)| labels.route == route)
            .map(|(_, value)| value)
            .sum()
    }

    pub fn durations_for(&self, route: &str) -> u64 {
        self.durations
            .iter()
            .filter(|(labels, _)| labels.route == route)
            .map(|(_, count)| count)
            .sum()
    }

    pub fn total_requests(&self) -> u64 {
        self.requests.iter().map(|(_, value)| value).sum()
    }

    pub fn total_durations(&self) -> u64 {
        self.durations.iter().map(|(_, count)| count).sum()
    }

    /// Distinct route labels seen on the request counter.
    pub fn routes(&self) -> Vec<String> {
        let mut routes: Vec<String> = self
            .requests
            .iter()
            .map(|(labels, _)| labels.route.clone())
            .collect();
        routes.sort();
        routes.dedup();
        routes
    }
}

/// Running server with in-memory telemetry.
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    pub spans: InMemorySpanExporter,
    pub metrics: InMemoryMetricsExporter,
    pub telemetry: Telemetry,
    pub telemetry_shutdown: TelemetryShutdown,
    shutdown_tx: watch::Sender<bool>,
    server: HttpServer,
}

impl TestServer {
    /// Start a server whose handlers never sleep and never fail.
    pub async fn start() -> Self {
        Self::with_simulator(ScriptedWorkSimulator::instant()).await
    }

    pub async fn with_simulator(simulator: impl WorkSimulator + 'static) -> Self {
        let spans = InMemorySpanExporter::default();
        let tracer_provider = TracerProvider::builder()
            .with_simple_exporter(spans.clone())
            .build();

        let metrics = InMemoryMetricsExporter::default();
        // Long interval: tests export explicitly through flush().
        let reader = PeriodicReader::builder(metrics.clone(), runtime::Tokio)
            .with_interval(Duration::from_secs(3600))
            .build();
        let meter_provider = SdkMeterProvider::builder().with_reader(reader).build();

        let (telemetry, telemetry_shutdown) = Telemetry::install(
            ServiceIdentity::new("backend", "test", "test"),
            tracer_provider,
            meter_provider,
        );

        let app = service::router(telemetry.clone(), Arc::new(simulator));
        let listener = server::bind("127.0.0.1:0").await.expect("bind test listener");
        let (shutdown_tx, _) = watch::channel(false);
        let server = HttpServer::spawn(listener, app, &shutdown_tx).expect("spawn server");

        Self {
            addr: server.local_addr(),
            client: reqwest::Client::new(),
            spans,
            metrics,
            telemetry,
            telemetry_shutdown,
            shutdown_tx,
            server,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET request failed")
    }

    pub async fn post(&self, path: &str) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .send()
            .await
            .expect("POST request failed")
    }

    /// Export everything recorded so far.
    pub async fn flush(&self) {
        self.telemetry_shutdown
            .flush()
            .await
            .expect("telemetry flush failed");
    }

    pub fn finished_spans(&self) -> Vec<SpanData> {
        self.spans.get_finished_spans().expect("read spans")
    }

    pub fn server_spans(&self) -> Vec<SpanData> {
        self.finished_spans()
            .into_iter()
            .filter(|span| span.span_kind == SpanKind::Server)
            .collect()
    }

    /// Flush and read the latest cumulative request metrics.
    pub async fn request_metrics(&self) -> RequestMetricsSnapshot {
        self.flush().await;
        let exported = self.metrics.get_finished_metrics().expect("read metrics");

        let mut snapshot = RequestMetricsSnapshot::default();
        let Some(latest) = exported.last() else {
            return snapshot;
        };
        for metric in latest.scope_metrics.iter().flat_map(|scope| &scope.metrics) {
            let data = metric.data.as_any();
            if metric.name == "http.server.requests" {
                if let Some(sum) = data.downcast_ref::<Sum<u64>>() {
                    snapshot.requests.extend(
                        sum.data_points
                            .iter()
                            .map(|point| (Labels::from_attributes(&point.attributes), point.value)),
                    );
                }
            } else if metric.name == "http.server.duration" {
                if let Some(histogram) = data.downcast_ref::<Histogram<f64>>() {
                    snapshot.durations.extend(
                        histogram
                            .data_points
                            .iter()
                            .map(|point| (Labels::from_attributes(&point.attributes), point.count)),
                    );
                }
            }
        }
        snapshot.requests.sort();
        snapshot.durations.sort();
        snapshot
    }

    /// Fire the shutdown channel and drain within `timeout`.
    pub async fn stop(self, timeout: Duration) -> Result<(), ServerError> {
        let _ = self.shutdown_tx.send(true);
        self.server.drain(timeout).await
    }
}
