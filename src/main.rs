//! cursor-relay server binary.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use cursor_relay::agent::AgentRunner;
use cursor_relay::config::{AppConfig, ALLOWED_RESPONSE_DOMAINS};
use cursor_relay::server::{self, AppState};
use cursor_relay::slack::Notifier;
use cursor_relay::store::{JobStore, SqliteStore};
use cursor_relay::tunnel::TunnelManager;
use cursor_relay::worker::{Dispatcher, JobQueue, TaskExecutor};

/// Grace allowed for in-flight HTTP handlers at shutdown.
const HTTP_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Bound on waiting for workers to finish their current job.
const WORKER_DRAIN_LIMIT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = AppConfig::from_env()?;

    match config.project_path().await {
        Some(path) => tracing::info!(%path, "initial project path from environment"),
        None => tracing::info!(
            "project path unset; set it via `/cursor set-path` or POST /api/config/project-path"
        ),
    }

    let store: Arc<dyn JobStore> = Arc::new(SqliteStore::open(Path::new(&config.db_path))?);
    tracing::info!(path = %config.db_path, "job store ready");

    server::ensure_port_available(config.port, config.auto_kill_port).await?;

    let (queue, queue_rx) = JobQueue::new(config.queue_capacity());
    let notifier = Notifier::new(
        ALLOWED_RESPONSE_DOMAINS
            .iter()
            .map(|d| d.to_string())
            .collect(),
    );
    let executor = Arc::new(TaskExecutor::new(
        config.clone(),
        Arc::clone(&store),
        AgentRunner::new(&config.cursor_cli_path),
        notifier,
    ));
    let dispatcher = Dispatcher::start(queue_rx, config.max_workers, executor);
    tracing::info!(
        workers = config.max_workers,
        queue_capacity = config.queue_capacity(),
        "worker pool ready"
    );

    let state = AppState {
        config: config.clone(),
        store: Arc::clone(&store),
        queue: queue.clone(),
    };
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(port = config.port, "listening");

    let tunnel = TunnelManager::start(config.port).await;
    if let Some(ref tunnel) = tunnel {
        tracing::info!(
            "point the Slack app's request URL at {}/slack/cursor",
            tunnel.public_url()
        );
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server_handle = tokio::spawn(async move {
        let shutdown = async {
            let _ = shutdown_rx.await;
        };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::error!("server error: {e}");
        }
    });

    wait_for_signal().await;
    tracing::info!("shutdown signal received, draining");

    // 1. Stop the accept path; in-flight handlers get a bounded grace.
    let _ = shutdown_tx.send(());
    if tokio::time::timeout(HTTP_SHUTDOWN_GRACE, server_handle)
        .await
        .is_err()
    {
        tracing::warn!(
            "HTTP server still busy after {:?}, abandoning it",
            HTTP_SHUTDOWN_GRACE
        );
    } else {
        tracing::info!("HTTP server stopped");
    }

    // 2. Close the queue; late submissions fail recoverably at the producer.
    queue.close();
    tracing::info!("job queue closed");

    // 3. Stop the dispatcher and wait for in-flight jobs.
    if dispatcher.stop(WORKER_DRAIN_LIMIT).await {
        tracing::info!("all workers stopped");
    }

    // 4. Stop the tunnel.
    if let Some(tunnel) = tunnel {
        tunnel.stop().await;
        tracing::info!("tunnel stopped");
    }

    // 5. The store closes when its last handle drops.
    drop(store);
    tracing::info!("shutdown complete");
    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable ({e}); watching ctrl-c only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
