//! Backend: a mock user API instrumented with OpenTelemetry.
//!
//! Every request is logged, counted, timed and traced, and all telemetry is
//! pushed to an OTLP collector over gRPC.
//!
//! # Architecture
//!
//! - **Explicit telemetry context**: tracer, meter and instruments are built
//!   once and passed to the router, never looked up globally
//! - **Interceptor pipeline**: access log, metrics and tracing stages wrap
//!   each handler in a fixed order
//! - **Ordered shutdown**: the listener drains within a bounded window
//!   before traces and then metrics are flushed
//!
//! # Modules
//!
//! - [`config`]: CLI and environment configuration
//! - [`lifecycle`]: Process state machine and termination signals
//! - [`middleware`]: Request telemetry pipeline
//! - [`observability`]: Logging, OTLP export and provider lifecycle
//! - [`server`]: HTTP listener and drain
//! - [`service`]: Route handlers and the work simulator

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions, // service::users::UserList is fine
    clippy::must_use_candidate,      // Not all functions need #[must_use]
    clippy::missing_errors_doc,      // Error docs can be verbose
    clippy::missing_panics_doc,      // Panic docs can be verbose
    clippy::cast_possible_wrap,      // usize -> i64 span attributes
    clippy::cast_possible_truncation // u128 millis -> u64 log fields
)]

pub mod config;
pub mod lifecycle;
pub mod middleware;
pub mod observability;
pub mod server;
pub mod service;
