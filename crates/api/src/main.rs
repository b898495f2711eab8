//! API server entry point.

use std::error::Error;
use std::sync::Arc;

use api::config::Config;
use ledger::{LedgerConfig, LoggingBroadcaster, StockLevelAlerts, StockPool, spawn_side_effects};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use stock_store::{InMemoryStockStore, PostgresStockStore, StockStore};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn Error + Send + Sync>;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Wires the pool, background tasks and router around `store`, then serves until shutdown.
async fn serve<S: StockStore + Clone + 'static>(
    store: S,
    config: &Config,
    metrics_handle: PrometheusHandle,
) -> Result<(), BoxError> {
    let ledger_config = LedgerConfig::from_env();
    tracing::info!(?ledger_config, "ledger configuration loaded");

    let pool = StockPool::with_config(store.clone(), ledger_config);

    // Alerts and broadcasts run off the committed event stream
    let side_effects = spawn_side_effects(
        pool.subscribe(),
        Arc::new(StockLevelAlerts::new(store)),
        Arc::new(LoggingBroadcaster),
    );

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let sweeper = pool.sweeper().spawn(async move {
        let _ = stop_rx.changed().await;
    });

    let app = api::create_app(api::create_state(pool), metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = stop_tx.send(true);
    if let Err(err) = sweeper.await {
        tracing::warn!(error = %err, "expiry sweeper ended abnormally");
    }
    side_effects.abort();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Pick the store and serve
    match &config.database_url {
        Some(url) => {
            let pg = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await?;
            let store = PostgresStockStore::new(pg);
            store.run_migrations().await?;
            tracing::info!("using PostgreSQL stock store");
            serve(store, &config, metrics_handle).await?;
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory stock store");
            serve(InMemoryStockStore::new(), &config, metrics_handle).await?;
        }
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}
