//! Process lifecycle: state machine and termination signals.

use std::fmt;

use tokio::sync::watch;

/// Process states, in the only order they may be entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ServiceState {
    /// Configuration, logging and telemetry are being set up.
    Starting,
    /// The listener accepts connections.
    Listening,
    /// The listener is closed; in-flight requests are finishing.
    Draining,
    /// Telemetry is shut down; the process is about to exit.
    Stopped,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Listening => "listening",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Forward-only state machine.
#[derive(Debug)]
pub struct Lifecycle {
    state: watch::Sender<ServiceState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ServiceState::Starting);
        Self { state }
    }

    pub fn state(&self) -> ServiceState {
        *self.state.borrow()
    }

    /// Move to `next` if it is later than the current state.
    ///
    /// Returns `false`, and changes nothing, for repeated or backward
    /// transitions.
    pub fn advance(&self, next: ServiceState) -> bool {
        let advanced = self.state.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        });
        if advanced {
            tracing::info!(state = %next, "Service state changed");
        } else {
            tracing::debug!(state = %next, current = %self.state(), "Ignoring state transition");
        }
        advanced
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Which signal asked the process to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("SIGINT"),
            Self::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Wait for SIGINT (Ctrl+C) or, on Unix, SIGTERM.
pub async fn wait_for_signal() -> std::io::Result<ShutdownSignal> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|()| ShutdownSignal::Interrupt),
            _ = sigterm.recv() => Ok(ShutdownSignal::Terminate),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok(ShutdownSignal::Interrupt)
    }
}

/// Forward the first termination signal into the shutdown channel.
///
/// A failure to install the handlers also triggers shutdown, since the
/// process could otherwise never be stopped gracefully.
pub fn spawn_signal_listener(shutdown_tx: watch::Sender<bool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(signal) => tracing::info!(%signal, "Received signal, initiating shutdown"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for signals, shutting down"),
        }
        let _ = shutdown_tx.send(true);
    })
}
