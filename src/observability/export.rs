//! OTLP exporter pipelines.
//!
//! Both signals go to the same collector over plaintext gRPC:
//! - Spans are queued by a batch processor and flushed on a schedule or
//!   when a batch fills up
//! - Metrics are collected and pushed by a periodic reader

use std::time::Duration;

use opentelemetry_otlp::{Protocol, WithExportConfig};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::{BatchConfigBuilder, Config as TraceConfig, Sampler, TracerProvider};
use opentelemetry_sdk::{runtime, Resource};

use super::telemetry::TelemetryError;

/// Collector address used when `OTEL_EXPORTER_OTLP_ENDPOINT` is unset.
pub const DEFAULT_COLLECTOR_ENDPOINT: &str = "otel-collector.observability.svc.cluster.local:4317";

/// Exporter settings shared by the trace and metric pipelines.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Collector address, with or without scheme.
    pub endpoint: String,
    /// Deadline for a single export call.
    pub timeout: Duration,
    /// How often the metric reader pushes.
    pub metric_interval: Duration,
    /// Maximum time a finished span waits in the pending batch.
    pub span_batch_delay: Duration,
    /// Pending span queue bound; spans beyond it are dropped.
    pub span_queue_size: usize,
    /// Maximum spans per export call.
    pub span_batch_size: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_COLLECTOR_ENDPOINT.to_string(),
            timeout: Duration::from_secs(10),
            metric_interval: Duration::from_secs(10),
            span_batch_delay: Duration::from_secs(5),
            span_queue_size: 2048,
            span_batch_size: 512,
        }
    }
}

impl ExportConfig {
    /// Collector URL as understood by the tonic channel.
    pub fn collector_url(&self) -> String {
        collector_url(&self.endpoint)
    }
}

/// Normalize a collector address into a URL.
///
/// An empty address falls back to [`DEFAULT_COLLECTOR_ENDPOINT`]. A bare
/// `host:port` gets an `http://` scheme, which makes the channel plaintext.
pub fn collector_url(endpoint: &str) -> String {
    let endpoint = endpoint.trim();
    let endpoint = if endpoint.is_empty() {
        DEFAULT_COLLECTOR_ENDPOINT
    } else {
        endpoint
    };

    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}

/// Build the OTLP trace pipeline with an always-on sampler.
///
/// Must be called from within a Tokio runtime: the batch processor spawns
/// its flush task on it.
pub fn otlp_tracer_provider(
    resource: Resource,
    config: &ExportConfig,
) -> Result<TracerProvider, TelemetryError> {
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(config.collector_url())
        .with_protocol(Protocol::Grpc)
        .with_timeout(config.timeout);

    let batch_config = BatchConfigBuilder::default()
        .with_max_queue_size(config.span_queue_size)
        .with_max_export_batch_size(config.span_batch_size)
        .with_scheduled_delay(config.span_batch_delay)
        .with_max_export_timeout(config.timeout)
        .build();

    let provider = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .with_trace_config(
            TraceConfig::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_resource(resource),
        )
        .with_batch_config(batch_config)
        .install_batch(runtime::Tokio)
        .map_err(TelemetryError::TraceExporter)?;

    tracing::info!(
        endpoint = %config.collector_url(),
        queue_size = config.span_queue_size,
        batch_size = config.span_batch_size,
        "OTLP trace exporter configured"
    );
    Ok(provider)
}

/// Build the OTLP metric pipeline with a periodic push reader.
pub fn otlp_meter_provider(
    resource: Resource,
    config: &ExportConfig,
) -> Result<SdkMeterProvider, TelemetryError> {
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(config.collector_url())
        .with_protocol(Protocol::Grpc)
        .with_timeout(config.timeout);

    let provider = opentelemetry_otlp::new_pipeline()
        .metrics(runtime::Tokio)
        .with_exporter(exporter)
        .with_resource(resource)
        .with_period(config.metric_interval)
        .with_timeout(config.timeout)
        .build()
        .map_err(TelemetryError::MetricExporter)?;

    tracing::info!(
        endpoint = %config.collector_url(),
        interval_ms = config.metric_interval.as_millis() as u64,
        "OTLP metrics exporter configured"
    );
    Ok(provider)
}
