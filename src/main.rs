//! Backend: mock user API with OpenTelemetry tracing and metrics.
//!
//! # Usage
//!
//! ```bash
//! backend --port 8080 --otel-endpoint otel-collector:4317 --log-level info
//! ```
//!
//! Environment variables can also be used:
//! - `BACKEND_PORT`: Port to listen on
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: Collector address (plaintext gRPC)
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use std::sync::Arc;

use anyhow::Context as _;
use tokio::sync::watch;

use backend::config::Config;
use backend::lifecycle::{spawn_signal_listener, Lifecycle, ServiceState};
use backend::observability::logging::init_logging;
use backend::observability::{init_telemetry, Telemetry};
use backend::server::{self, HttpServer, ServerError};
use backend::service::{self, RandomWorkSimulator};

/// Print startup banner with version and configuration.
fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        r#"
  Backend v{}

  Configuration:
    Address:      {}
    Collector:    {}
    Environment:  {}
    Log Level:    {}

  Press Ctrl+C to shutdown gracefully.
"#,
        version,
        config.bind_address(),
        config.otel_endpoint,
        config.environment,
        config.log_level
    );
}

/// Serve until a termination signal, then drain within the configured bound.
async fn serve(
    config: &Config,
    telemetry: Telemetry,
    lifecycle: &Lifecycle,
) -> Result<(), ServerError> {
    let simulator = Arc::new(RandomWorkSimulator::new(config.failure_rate));
    let app = service::router(telemetry, simulator);

    let listener = server::bind(&config.bind_address()).await?;
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let server = HttpServer::spawn(listener, app, &shutdown_tx)?;

    tracing::info!(address = %server.local_addr(), "Backend listening");
    lifecycle.advance(ServiceState::Listening);

    let signals = spawn_signal_listener(shutdown_tx.clone());

    // Either a signal or a failed server task flips the flag.
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
    lifecycle.advance(ServiceState::Draining);
    signals.abort();

    server.drain(config.shutdown_timeout()).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration from CLI arguments and environment
    let config = Config::parse_args();

    // Logging comes first; the guard flushes output on every exit path
    let _log_guard =
        init_logging(&config.log_level, config.log_format).context("failed to initialize logging")?;
    let lifecycle = Lifecycle::new();

    print_banner(&config);

    let identity = config.service_identity()?;
    let (telemetry, telemetry_shutdown) = init_telemetry(identity, &config.export_config())
        .context("failed to initialize telemetry")?;

    let served = serve(&config, telemetry, &lifecycle).await;
    if let Err(e) = &served {
        tracing::error!(error = %e, "Server did not shut down cleanly");
    }

    // Listener is closed (or aborted) before the providers are flushed
    let flushed = telemetry_shutdown.shutdown().await;
    lifecycle.advance(ServiceState::Stopped);

    served?;
    flushed?;

    tracing::info!("Backend shutdown complete");
    Ok(())
}
