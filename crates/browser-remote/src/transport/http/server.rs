//! HTTP server implementation.

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::service::RelayService;

use super::routes::routes;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5555,
        }
    }
}

/// Serve relay requests until a signal arrives or `native_closed` resolves.
///
/// In-flight requests are allowed to finish (answer or timeout) before this
/// returns.
pub async fn serve<F>(
    config: ServerConfig,
    service: Arc<RelayService>,
    native_closed: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    let actual_addr = listener.local_addr()?;
    serve_on(listener, service, native_closed).await?;
    info!(%actual_addr, "Server shutdown complete");
    Ok(())
}

/// Same as [`serve`] on an already-bound listener.
pub async fn serve_on<F>(
    listener: TcpListener,
    service: Arc<RelayService>,
    native_closed: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = routes(service);
    info!("Starting browser-remote server on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(native_closed))
        .await?;

    Ok(())
}

/// Wait for SIGINT, SIGTERM or the native peer going away.
async fn shutdown_signal<F>(native_closed: F)
where
    F: Future<Output = ()>,
{
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, starting graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, starting graceful shutdown"),
        _ = native_closed => info!("Native peer closed, starting graceful shutdown"),
    }
}
