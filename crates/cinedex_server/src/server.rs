//! HTTP server lifecycle.

use crate::error::{ServerError, ServerResult};
use crate::router::{router, AppState};
use axum::Router;
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};

/// The cinedex API server.
///
/// # Example
///
/// ```rust,ignore
/// let state = AppState::new(config, catalog, accounts, Arc::new(LogMailer));
/// let listener = TcpListener::bind(state.config().bind_addr).await?;
/// Server::new(state).run(listener, shutdown_signal()).await?;
/// ```
pub struct Server {
    state: AppState,
}

impl Server {
    /// Creates a server over `state`.
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Builds the router without binding a socket.
    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Serves on `listener` until `shutdown` resolves.
    ///
    /// After the signal no new connections are accepted. In-flight
    /// requests get `shutdown_grace` to complete, then outstanding
    /// background tasks get `background_drain`. Background work is drained
    /// even when the grace period elapses, in which case the result is
    /// [`ServerError::ShutdownTimeout`].
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let config = self.state.config.clone();
        let addr = listener.local_addr()?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let sweeper = config
            .limiter
            .enabled
            .then(|| self.state.limiter.spawn_sweeper(stop_rx));

        let (fired_tx, fired_rx) = oneshot::channel();
        let signal = async move {
            shutdown.await;
            let _ = fired_tx.send(());
        };

        let app = self.router();
        let serve = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .into_future();
        tokio::pin!(serve);

        tracing::info!(%addr, env = %config.environment, "starting server");

        let mut result = tokio::select! {
            biased;
            served = &mut serve => served.map_err(ServerError::from),
            _ = fired_rx => {
                tracing::info!(grace = ?config.shutdown_grace, "shutting down server");
                match tokio::time::timeout(config.shutdown_grace, &mut serve).await {
                    Ok(served) => served.map_err(ServerError::from),
                    Err(_) => {
                        tracing::error!("in-flight requests outlived the shutdown grace period");
                        Err(ServerError::ShutdownTimeout)
                    }
                }
            }
        };

        let pending = self.state.tasks.outstanding();
        if pending > 0 {
            tracing::info!(pending, "completing background tasks");
        }
        if !self.state.tasks.wait_timeout(config.background_drain).await {
            tracing::warn!(
                remaining = self.state.tasks.outstanding(),
                "background tasks still running after drain period"
            );
            if result.is_ok() {
                result = Err(ServerError::ShutdownTimeout);
            }
        }

        let _ = stop_tx.send(true);
        if let Some(sweeper) = sweeper {
            let _ = sweeper.await;
        }

        tracing::info!(%addr, "stopped server");
        result
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!(signal = "interrupt", "caught signal"),
        () = terminate => tracing::info!(signal = "terminate", "caught signal"),
    }
}
