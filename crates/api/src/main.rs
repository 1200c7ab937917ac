//! API server entry point.

use std::error::Error;
use std::sync::Arc;

use api::AppState;
use api::config::{Config, LogFormat};
use checkout::{
    ExpirySweeper, InMemoryCartStore, InMemoryOrchestrator, ReleaseCoordinator,
};
use inventory_store::{InMemoryInventoryStore, InventoryStore, PostgresInventoryStore};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn Error + Send + Sync>;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
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

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let json = config.log_format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // 1. Configuration and tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Pick the store
    match config.database_url.as_deref() {
        Some(url) => {
            let store =
                PostgresInventoryStore::connect(url, config.database_max_connections).await?;
            store.run_migrations().await?;
            tracing::info!("using PostgreSQL inventory store");
            serve(config, store, metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory inventory store");
            serve(config, InMemoryInventoryStore::new(), metrics_handle).await
        }
    }
}

async fn serve<S>(config: Config, store: S, metrics_handle: PrometheusHandle) -> Result<(), BoxError>
where
    S: InventoryStore + Clone + 'static,
{
    let settings = config.reservation_settings();

    // 4. Background expiry sweeper
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = ExpirySweeper::new(
        store.clone(),
        ReleaseCoordinator::new(store.clone(), settings),
    )
    .with_interval(config.sweep_interval())
    .spawn(shutdown_rx);

    // 5. Build the application
    let state = Arc::new(AppState::new(
        store,
        InMemoryCartStore::new(),
        InMemoryOrchestrator::new(),
        config.pricing(),
        settings,
    ));
    let app = api::create_app(state, metrics_handle);

    // 6. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 7. Stop the sweeper
    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        tracing::error!(error = %e, "expiry sweeper task failed");
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}
