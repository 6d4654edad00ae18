//! Tracer and meter provider lifecycle.
//!
//! [`init_telemetry`] builds the resource descriptor, both OTLP pipelines and
//! the request instruments, and returns:
//! - [`Telemetry`]: the explicit context handed to the router and middleware
//! - [`TelemetryShutdown`]: the single handle that flushes and closes both
//!   providers, traces first

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use opentelemetry::metrics::{MeterProvider as _, MetricsError};
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::trace::{TraceError, TracerProvider as _};
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::{Tracer, TracerProvider};
use opentelemetry_sdk::Resource;

use super::export::{otlp_meter_provider, otlp_tracer_provider, ExportConfig};
use super::metrics::RequestInstruments;
use super::propagation::composite_propagator;

/// Instrumentation scope name of the tracer.
pub const TRACER_NAME: &str = "backend-tracer";

/// Instrumentation scope name of the meter.
pub const METER_NAME: &str = "backend-meter";

/// Errors raised while building or closing the telemetry providers.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid resource attribute '{0}', expected key=value")]
    InvalidResourceAttribute(String),

    #[error("failed to build trace exporter: {0}")]
    TraceExporter(#[source] TraceError),

    #[error("failed to build metric exporter: {0}")]
    MetricExporter(#[source] MetricsError),

    #[error("tracer provider flush failed: {0}")]
    TraceFlush(#[source] TraceError),

    #[error("meter provider flush failed: {0}")]
    MetricFlush(#[source] MetricsError),

    #[error("tracer provider shutdown failed: {0}")]
    TraceShutdown(#[source] TraceError),

    #[error("meter provider shutdown failed: {0}")]
    MetricShutdown(#[source] MetricsError),

    #[error("telemetry flush task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Identity of this process, attached to every exported span and metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    name: String,
    version: String,
    environment: String,
    attributes: Vec<(String, String)>,
}

impl ServiceIdentity {
    /// Create an identity without custom tags.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            environment: environment.into(),
            attributes: Vec::new(),
        }
    }

    /// Add a custom tag.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Parse a `key=value` tag.
    pub fn parse_attribute(raw: &str) -> Result<(String, String), TelemetryError> {
        match raw.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(TelemetryError::InvalidResourceAttribute(raw.to_string())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// Build the resource descriptor.
    ///
    /// SDK defaults (telemetry.sdk.*) are kept; identity fields win on
    /// conflicting keys.
    pub fn resource(&self) -> Resource {
        let mut kvs = vec![
            KeyValue::new("service.name", self.name.clone()),
            KeyValue::new("service.version", self.version.clone()),
            KeyValue::new("deployment.environment", self.environment.clone()),
        ];
        kvs.extend(
            self.attributes
                .iter()
                .map(|(k, v)| KeyValue::new(k.clone(), v.clone())),
        );
        Resource::default().merge(&Resource::new(kvs))
    }
}

/// Explicit telemetry context shared by the router, middleware and handlers.
///
/// Cheap to clone; all clones record into the same providers.
#[derive(Clone)]
pub struct Telemetry {
    tracer: Tracer,
    instruments: RequestInstruments,
    propagator: Arc<TextMapCompositePropagator>,
    identity: Arc<ServiceIdentity>,
}

impl Telemetry {
    /// Build the context from already constructed providers.
    ///
    /// Does not register anything globally; [`init_telemetry`] does that for
    /// the OTLP pipelines.
    pub fn install(
        identity: ServiceIdentity,
        tracer_provider: TracerProvider,
        meter_provider: SdkMeterProvider,
    ) -> (Self, TelemetryShutdown) {
        let tracer = tracer_provider.tracer(TRACER_NAME);
        let meter = meter_provider.meter(METER_NAME);
        let instruments = RequestInstruments::new(&meter);

        let telemetry = Self {
            tracer,
            instruments,
            propagator: Arc::new(composite_propagator()),
            identity: Arc::new(identity),
        };
        let shutdown = TelemetryShutdown {
            tracer_provider,
            meter_provider,
            closed: Arc::new(AtomicBool::new(false)),
        };
        (telemetry, shutdown)
    }

    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    pub fn instruments(&self) -> &RequestInstruments {
        &self.instruments
    }

    pub fn propagator(&self) -> &TextMapCompositePropagator {
        &self.propagator
    }

    pub fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }
}

/// Handle that drains and closes both providers.
///
/// Clones share the same closed flag, so only the first [`shutdown`]
/// does any work.
///
/// [`shutdown`]: TelemetryShutdown::shutdown
#[derive(Clone)]
pub struct TelemetryShutdown {
    tracer_provider: TracerProvider,
    meter_provider: SdkMeterProvider,
    closed: Arc<AtomicBool>,
}

impl TelemetryShutdown {
    /// Export everything pending without closing the providers.
    pub async fn flush(&self) -> Result<(), TelemetryError> {
        if self.is_closed() {
            return Ok(());
        }
        let tracer_provider = self.tracer_provider.clone();
        let meter_provider = self.meter_provider.clone();

        // SDK flush blocks on the exporter tasks.
        tokio::task::spawn_blocking(move || {
            let trace_result = tracer_provider
                .force_flush()
                .into_iter()
                .find_map(Result::err)
                .map_or(Ok(()), |e| Err(TelemetryError::TraceFlush(e)));
            let metric_result = meter_provider
                .force_flush()
                .map_err(TelemetryError::MetricFlush);
            trace_result.and(metric_result)
        })
        .await?
    }

    /// Flush and close the tracer provider, then the meter provider.
    ///
    /// Both are always attempted; the first error is returned. Calling this
    /// again after it has run is a no-op.
    pub async fn shutdown(&self) -> Result<(), TelemetryError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Telemetry already shut down");
            return Ok(());
        }
        let tracer_provider = self.tracer_provider.clone();
        let meter_provider = self.meter_provider.clone();

        let result = tokio::task::spawn_blocking(move || {
            let trace_result = tracer_provider
                .shutdown()
                .map_err(TelemetryError::TraceShutdown);
            let metric_result = meter_provider
                .shutdown()
                .map_err(TelemetryError::MetricShutdown);
            trace_result.and(metric_result)
        })
        .await?;

        match &result {
            Ok(()) => tracing::info!("Telemetry providers flushed and closed"),
            Err(e) => tracing::error!(error = %e, "Telemetry shutdown failed"),
        }
        result
    }

    /// Whether [`shutdown`](Self::shutdown) has already run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Initialize OTLP tracing and metrics for the service.
///
/// Registers both providers and the W3C propagator as process-wide defaults
/// and returns the explicit context plus its shutdown handle. Any failure
/// here is fatal: there is no telemetry-disabled mode.
pub fn init_telemetry(
    identity: ServiceIdentity,
    export: &ExportConfig,
) -> Result<(Telemetry, TelemetryShutdown), TelemetryError> {
    let resource = identity.resource();

    let tracer_provider = otlp_tracer_provider(resource.clone(), export)?;
    let meter_provider = otlp_meter_provider(resource, export)?;

    global::set_tracer_provider(tracer_provider.clone());
    global::set_meter_provider(meter_provider.clone());
    global::set_text_map_propagator(composite_propagator());

    tracing::info!(
        service = identity.name(),
        version = identity.version(),
        environment = identity.environment(),
        "Telemetry initialized"
    );

    Ok(Telemetry::install(identity, tracer_provider, meter_provider))
}
