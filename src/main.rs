use std::sync::Arc;

use aggregator_cache::api::{self, AppState};
use aggregator_cache::config::{AppConfig, LogFormat};
use aggregator_cache::{ConnectionManager, Metrics, RedisStorage};
use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cfg = AppConfig::from_env()?;
    init_tracing(cfg.log_format);

    let shutdown = CancellationToken::new();
    let storage_cfg = cfg.storage();
    let connection = ConnectionManager::new(&storage_cfg.redis)
        .context("invalid Redis configuration")?
        .with_cancellation(shutdown.clone());

    let metrics = Metrics::new()?;
    let storage = RedisStorage::with_connection(connection, storage_cfg.expiration)
        .context("invalid storage configuration")?
        .with_metrics(metrics.clone());

    storage
        .init()
        .await
        .context("failed to connect to Redis")?;

    tracing::info!(
        mode = ?storage.mode(),
        expiration_seconds = storage.expiration().as_secs(),
        "storage ready"
    );

    let app = api::router(AppState {
        storage: Arc::new(storage),
        metrics,
    });

    let listen_addr = cfg.listen_addr();
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;

    tracing::info!(%listen_addr, "starting aggregator cache");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("aggregator cache exited cleanly");

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(%error, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term_signal) => term_signal.recv().await,
            Err(error) => {
                tracing::warn!(%error, "failed to install SIGTERM handler");
                None
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
    shutdown.cancel();
}
