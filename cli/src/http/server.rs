//! Reference backend lifecycle.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{middleware, Router};
use statelink_core::api::{AppConfig, CliError};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use super::{
    middleware::{create_middleware_stack, create_trace_layer, request_logger},
    routes::create_router,
    AppState,
};
use crate::commands::cli::ServeArgs;

/// Handles `statelink serve`. CLI flags win over the `[http_server]` section.
pub async fn handle_serve(args: ServeArgs, cfg: &AppConfig) -> Result<(), CliError> {
    let host = args.host.unwrap_or_else(|| cfg.http_server.host.clone());
    let port = args.port.unwrap_or(cfg.http_server.port);
    let calibrate_ms = args.calibrate_ms.or(cfg.http_server.calibrate_ms);

    let state = AppState::new(calibrate_ms.map(Duration::from_millis));
    let listener = bind(&host, port).await?;
    if let Some(ms) = calibrate_ms {
        info!("CALIBRATE promotes to READY after {ms}ms");
    }
    serve(listener, state).await
}

pub fn build_app(state: AppState) -> Router {
    create_router(state)
        .layer(middleware::from_fn(request_logger))
        .layer(create_trace_layer())
        .layer(create_middleware_stack())
}

pub async fn bind(host: &str, port: u16) -> Result<TcpListener, CliError> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| CliError::Config(format!("invalid listen address {host}:{port}: {e}")))?;
    TcpListener::bind(addr)
        .await
        .map_err(|e| CliError::Command(format!("bind {addr} failed: {e}")))
}

/// Serves until Ctrl+C, SIGTERM, or [`AppState::shutdown`].
pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), CliError> {
    let addr = listener.local_addr()?;
    info!("backend listening on http://{addr} (stream at ws://{addr}/ws)");

    let app = build_app(state.clone());
    let mut shutdown_rx = state.shutdown_tx.subscribe();

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = signal::ctrl_c() => info!("Received Ctrl+C signal"),
                _ = shutdown_rx.recv() => info!("Received shutdown request"),
                _ = wait_for_sigterm() => info!("Received SIGTERM signal"),
            }
            // Observer sessions are long-lived; tell them to close.
            state.shutdown();
            info!("Starting graceful shutdown...");
        })
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!("SIGTERM handler unavailable: {e}");
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_rejects_bad_address() {
        let err = bind("not a host", 8000).await.unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
        assert_eq!(err.exit_code(), 11);
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let listener = bind("127.0.0.1", 0).await.unwrap();
        let state = AppState::new(None);
        let server = tokio::spawn(serve(listener, state.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        state.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
