//! HTTP server setup and lifecycle.
//!
//! Runs the axum router on its own task with:
//! - Peer address connect info for the access log
//! - Graceful shutdown driven by a `watch` channel
//! - A bounded drain window for in-flight requests

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};

/// Errors raised while running or stopping the HTTP server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("HTTP server failed: {0}")]
    Serve(#[source] io::Error),

    #[error("in-flight requests did not finish within {0:?}, forcing shutdown")]
    DrainTimeout(Duration),

    #[error("server task failed: {0}")]
    Join(#[from] JoinError),
}

/// Bind the listening socket.
pub async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    })
}

/// Handle to the spawned server task.
#[derive(Debug)]
pub struct HttpServer {
    local_addr: SocketAddr,
    task: JoinHandle<Result<(), ServerError>>,
}

impl HttpServer {
    /// Start serving `app` on `listener`.
    ///
    /// The server stops accepting connections once `true` is sent on the
    /// shutdown channel. If serving fails, the task sends `true` itself so
    /// the rest of the process shuts down too.
    pub fn spawn(
        listener: TcpListener,
        app: Router,
        shutdown_tx: &watch::Sender<bool>,
    ) -> Result<Self, ServerError> {
        let local_addr = listener.local_addr().map_err(ServerError::Serve)?;
        let mut shutdown_rx = shutdown_tx.subscribe();
        let trigger = shutdown_tx.clone();

        let task = tokio::spawn(async move {
            let result = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
                tracing::info!("Shutdown signal received, closing listener");
            })
            .await;

            if let Err(e) = &result {
                tracing::error!(error = %e, "HTTP server failed");
                let _ = trigger.send(true);
            }
            result.map_err(ServerError::Serve)
        });

        Ok(Self { local_addr, task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the server task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for in-flight requests to finish, at most `timeout`.
    ///
    /// Call after the shutdown channel has fired. On timeout the server task
    /// is aborted and remaining connections are left to process exit.
    pub async fn drain(self, timeout: Duration) -> Result<(), ServerError> {
        let abort = self.task.abort_handle();
        match tokio::time::timeout(timeout, self.task).await {
            Ok(joined) => {
                joined??;
                tracing::info!("HTTP server drained");
                Ok(())
            }
            Err(_) => {
                abort.abort();
                tracing::error!(timeout_ms = timeout.as_millis() as u64, "Drain timed out, aborting server");
                Err(ServerError::DrainTimeout(timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    #[tokio::test]
    async fn test_bind_reports_address() {
        let listener = bind("127.0.0.1:0").await.unwrap();
        let taken = listener.local_addr().unwrap().to_string();

        match bind(&taken).await {
            Err(ServerError::Bind { addr, .. }) => assert_eq!(addr, taken),
            other => panic!("expected bind error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_idle_server_drains_immediately() {
        let listener = bind("127.0.0.1:0").await.unwrap();
        let app = Router::new().route("/", get(|| async { "ok" }));
        let (shutdown_tx, _rx) = watch::channel(false);

        let server = HttpServer::spawn(listener, app, &shutdown_tx).unwrap();
        assert_ne!(server.local_addr().port(), 0);
        assert!(!server.is_finished());

        shutdown_tx.send(true).unwrap();
        server.drain(Duration::from_secs(2)).await.unwrap();
    }
}
