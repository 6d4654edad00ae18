//! Configuration parsing for the backend service.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides (including the standard `OTEL_*` names)
//! - Sensible defaults for running inside the cluster

use clap::Parser;
use std::time::Duration;

use crate::observability::export::{ExportConfig, DEFAULT_COLLECTOR_ENDPOINT};
use crate::observability::logging::LogFormat;
use crate::observability::telemetry::{ServiceIdentity, TelemetryError};

/// Backend: mock user API instrumented with OpenTelemetry.
#[derive(Parser, Debug, Clone)]
#[command(name = "backend")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Host address to bind to
    #[arg(long, env = "BACKEND_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "BACKEND_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "BACKEND_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// OpenTelemetry collector endpoint (gRPC, plaintext)
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT", default_value = DEFAULT_COLLECTOR_ENDPOINT)]
    pub otel_endpoint: String,

    /// Timeout for a single OTLP export call, in milliseconds
    #[arg(long, env = "OTEL_EXPORTER_OTLP_TIMEOUT", default_value_t = 10_000)]
    pub otel_timeout_ms: u64,

    /// Interval between metric pushes, in milliseconds
    #[arg(long, env = "OTEL_METRIC_EXPORT_INTERVAL", default_value_t = 10_000)]
    pub metric_export_interval_ms: u64,

    /// Maximum delay before a pending span batch is exported, in milliseconds
    #[arg(long, env = "OTEL_BSP_SCHEDULE_DELAY", default_value_t = 5_000)]
    pub span_batch_delay_ms: u64,

    /// Maximum number of finished spans buffered before new ones are dropped
    #[arg(long, env = "OTEL_BSP_MAX_QUEUE_SIZE", default_value_t = 2048)]
    pub span_queue_size: usize,

    /// Maximum number of spans sent in one export call
    #[arg(long, env = "OTEL_BSP_MAX_EXPORT_BATCH_SIZE", default_value_t = 512)]
    pub span_batch_size: usize,

    /// Service name reported in the telemetry resource
    #[arg(long, env = "OTEL_SERVICE_NAME", default_value = "backend")]
    pub service_name: String,

    /// Service version reported in the telemetry resource
    #[arg(long, env = "BACKEND_SERVICE_VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    pub service_version: String,

    /// Deployment environment reported in the telemetry resource
    #[arg(long, env = "DEPLOYMENT_ENVIRONMENT", default_value = "development")]
    pub environment: String,

    /// Extra resource attributes as comma separated key=value pairs
    #[arg(
        long,
        env = "BACKEND_RESOURCE_ATTRIBUTES",
        value_delimiter = ',',
        default_value = "application=backend-api"
    )]
    pub resource_attributes: Vec<String>,

    /// Seconds to wait for in-flight requests during shutdown
    #[arg(long, env = "BACKEND_SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,

    /// Probability that POST /api/process fails (0.0 - 1.0)
    #[arg(long, env = "BACKEND_PROCESS_FAILURE_RATE", default_value_t = 0.05, value_parser = parse_probability)]
    pub failure_rate: f64,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Socket address string the HTTP listener binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Bounded window for draining in-flight requests.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Exporter settings for the OTLP trace and metric pipelines.
    pub fn export_config(&self) -> ExportConfig {
        ExportConfig {
            endpoint: self.otel_endpoint.clone(),
            timeout: Duration::from_millis(self.otel_timeout_ms),
            metric_interval: Duration::from_millis(self.metric_export_interval_ms),
            span_batch_delay: Duration::from_millis(self.span_batch_delay_ms),
            span_queue_size: self.span_queue_size,
            span_batch_size: self.span_batch_size,
        }
    }

    /// Identity attributes attached to every exported span and metric.
    pub fn service_identity(&self) -> Result<ServiceIdentity, TelemetryError> {
        let mut identity = ServiceIdentity::new(
            self.service_name.clone(),
            self.service_version.clone(),
            self.environment.clone(),
        );
        for raw in self.resource_attributes.iter().filter(|s| !s.trim().is_empty()) {
            let (key, value) = ServiceIdentity::parse_attribute(raw)?;
            identity = identity.with_attribute(key, value);
        }
        Ok(identity)
    }

    /// Create a default configuration for testing.
    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0, // Random port
            log_level: "debug".into(),
            log_format: LogFormat::Pretty,
            otel_endpoint: "http://127.0.0.1:4317".into(),
            otel_timeout_ms: 1_000,
            metric_export_interval_ms: 1_000,
            span_batch_delay_ms: 100,
            span_queue_size: 128,
            span_batch_size: 32,
            service_name: "backend-test".into(),
            service_version: "0.0.0".into(),
            environment: "test".into(),
            resource_attributes: vec!["application=backend-api".into()],
            shutdown_timeout_secs: 1,
            failure_rate: 0.0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            log_level: "info".into(),
            log_format: LogFormat::Json,
            otel_endpoint: DEFAULT_COLLECTOR_ENDPOINT.into(),
            otel_timeout_ms: 10_000,
            metric_export_interval_ms: 10_000,
            span_batch_delay_ms: 5_000,
            span_queue_size: 2048,
            span_batch_size: 512,
            service_name: "backend".into(),
            service_version: env!("CARGO_PKG_VERSION").into(),
            environment: "development".into(),
            resource_attributes: vec!["application=backend-api".into()],
            shutdown_timeout_secs: 5,
            failure_rate: 0.05,
        }
    }
}

fn parse_probability(raw: &str) -> Result<f64, String> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|e| format!("not a number: {e}"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is outside 0.0..=1.0"))
    }
}
