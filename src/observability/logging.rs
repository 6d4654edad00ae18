//! Structured logging setup.
//!
//! Configures the process-wide `tracing` subscriber with:
//! - JSON lines for production (RFC 3339 timestamps, flattened fields)
//! - A human readable format for local development
//! - A guard that flushes stdout/stderr when the process exits

use std::io::Write;

use clap::ValueEnum;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line.
    Json,
    /// Multi-field human readable lines.
    Pretty,
}

/// Errors raised while installing the logger.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("logger already installed: {0}")]
    AlreadyInstalled(#[from] TryInitError),
}

/// Flushes buffered log output on drop.
///
/// Hold it in `main` for the lifetime of the process so that every exit
/// path, including fatal errors returned from `main`, flushes the sink.
#[must_use = "logs may be lost if the guard is dropped early"]
#[derive(Debug)]
pub struct LogGuard {
    _private: (),
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();
    }
}

/// Initialize the global logger.
///
/// Must run once, before any other component logs.
///
/// # Arguments
///
/// * `level` - Filter directives, e.g. `info` or `backend=debug,tower_http=info`
/// * `format` - Output encoding
pub fn init_logging(level: &str, format: LogFormat) -> Result<LogGuard, LoggingError> {
    let filter = EnvFilter::try_new(level)?;

    let json_layer = (format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
    });

    let pretty_layer = (format == LogFormat::Pretty).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()?;

    tracing::info!(?format, "Logger initialized");
    Ok(LogGuard { _private: () })
}

/// Initialize tracing for tests (only logs errors).
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("error")
        .with_test_writer()
        .try_init();
}
