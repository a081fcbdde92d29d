//! streamforge-server: HTTP API, ingest hooks, and background tasks.
//!
//! This crate wires the transcoding supervisor into a running service:
//!
//! - Axum HTTP API with API key auth, rate limiting, and SSE
//! - Publish hooks for the RTMP ingest server
//! - Prometheus metrics fed from the event bus
//! - Periodic retention sweep of the HLS root
//! - Graceful shutdown that stops every encoder before returning

pub mod context;
pub mod error;
pub mod ingest;
pub mod middleware;
pub mod retention;
pub mod router;
pub mod routes;
pub mod telemetry;
pub mod tokens;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use streamforge_core::config::Config;
use streamforge_transcode::{FfmpegWorkerFactory, WorkerFactory};
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;

/// How long shutdown waits for encoders to exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(15);

/// Start the streamforge server with the ffmpeg worker backend.
///
/// Returns when a shutdown signal is received and every encoder has been
/// stopped.
pub async fn start(config: Config) -> streamforge_core::Result<()> {
    start_with_factory(config, Arc::new(FfmpegWorkerFactory)).await
}

/// Like [`start`], with a caller-chosen worker backend.
pub async fn start_with_factory(
    config: Config,
    factory: Arc<dyn WorkerFactory>,
) -> streamforge_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let hls_root = config.storage.hls_root.clone();
    if !hls_root.exists() {
        std::fs::create_dir_all(&hls_root)?;
        tracing::info!("Created HLS root {}", hls_root.display());
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| streamforge_core::Error::Validation(format!("Invalid server address: {e}")))?;

    let ctx = AppContext::new(config, factory)?;
    let cancel = CancellationToken::new();
    let tasks = spawn_background(&ctx, &cancel);

    let app = router::build_router(ctx.clone());
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        streamforge_core::Error::Internal(format!("Failed to bind to {addr}: {e}"))
    })?;
    tracing::info!(
        profiles = ?ctx.config.transcoding.profiles,
        max_streams = ctx.config.transcoding.max_concurrent_streams,
        "Listening on {addr}"
    );

    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await;

    cancel.cancel();
    for task in tasks {
        let _ = task.await;
    }
    ctx.supervisor.stop_all(SHUTDOWN_TIMEOUT).await;
    tracing::info!("Server shutdown complete");

    serve_result.map_err(|e| streamforge_core::Error::Internal(format!("Server error: {e}")))
}

/// Spawn the metrics recorder and retention sweep.
pub fn spawn_background(
    ctx: &AppContext,
    cancel: &CancellationToken,
) -> Vec<tokio::task::JoinHandle<()>> {
    let mut tasks = Vec::new();

    if let Some(metrics) = ctx.metrics.clone() {
        tasks.push(tokio::spawn(telemetry::run_recorder(
            metrics,
            ctx.event_bus.clone(),
            ctx.supervisor.clone(),
            cancel.clone(),
        )));
    }

    if ctx.config.cleanup.enabled && ctx.config.cleanup.interval_hours > 0 {
        tasks.push(tokio::spawn(retention::run_retention(
            ctx.config.storage.hls_root.clone(),
            ctx.config.cleanup.clone(),
            ctx.supervisor.clone(),
            cancel.clone(),
        )));
    }

    tasks
}

/// Wait for SIGINT, SIGTERM, or cancellation.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamforge_transcode::mock::MockWorkerFactory;

    #[tokio::test]
    async fn context_rejects_unknown_profile() {
        let mut config = Config::default();
        config.transcoding.profiles = vec!["nope".into()];
        let err = AppContext::new(config, Arc::new(MockWorkerFactory::new())).err();
        assert!(matches!(err, Some(streamforge_core::Error::UnknownProfile(_))));
    }

    #[tokio::test]
    async fn background_tasks_follow_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.hls_root = dir.path().to_path_buf();
        config.metrics.enabled = false;
        config.cleanup.enabled = false;
        let ctx = AppContext::new(config, Arc::new(MockWorkerFactory::new())).unwrap();
        let cancel = CancellationToken::new();
        assert!(spawn_background(&ctx, &cancel).is_empty());
    }

    #[tokio::test]
    async fn background_tasks_stop_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.hls_root = dir.path().to_path_buf();
        let ctx = AppContext::new(config, Arc::new(MockWorkerFactory::new())).unwrap();
        let cancel = CancellationToken::new();
        let tasks = spawn_background(&ctx, &cancel);
        assert_eq!(tasks.len(), 2);
        cancel.cancel();
        for task in tasks {
            tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .unwrap()
                .unwrap();
        }
    }
}
