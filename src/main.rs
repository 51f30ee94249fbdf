use std::sync::Arc;

use rider_sync::api;
use rider_sync::config::{Config, LogFormat};
use rider_sync::engine::propagation::Propagator;
use rider_sync::error::AppError;
use rider_sync::state::AppState;
use rider_sync::store::checkpoint::{CheckpointStore, FileCheckpoint, MemoryCheckpoint};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Compact => subscriber.compact().init(),
        LogFormat::Json => subscriber.json().init(),
    }

    let shared_state = Arc::new(AppState::in_memory(
        config.change_feed_buffer_size,
        config.change_history_size,
    ));
    let checkpoints: Arc<dyn CheckpointStore> = match &config.checkpoint_path {
        Some(path) => Arc::new(FileCheckpoint::new(path)),
        None => Arc::new(MemoryCheckpoint::new()),
    };

    let propagator = Propagator::new(
        shared_state.rider_feed.clone(),
        shared_state.orders.clone(),
        checkpoints,
        shared_state.metrics.clone(),
    )
    .with_delete_policy(config.rider_delete_policy)
    .with_resubscribe_delay(config.resubscribe_delay)
    .spawn();

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        delete_policy = ?config.rider_delete_policy,
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    propagator.stop().await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
