//! OpenTelemetry observability infrastructure.
//!
//! Provides:
//! - Structured logging via `tracing`
//! - OTLP trace and metric export pipelines
//! - The explicit [`Telemetry`] context and its shutdown handle
//! - Request instruments and W3C context propagation

pub mod export;
pub mod logging;
pub mod metrics;
pub mod propagation;
pub mod telemetry;

pub use telemetry::{init_telemetry, ServiceIdentity, Telemetry, TelemetryError, TelemetryShutdown};
