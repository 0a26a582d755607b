//! Herald API server binary entrypoint.
//!
//! Runs the HTTP front door and the delivery worker in one process.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use herald_common::config::AppConfig;
use herald_common::db;
use herald_formatter::Formatter;
use herald_notifier::{
    AdapterSet, DeliveryEngine, DeliveryWorker, MemoryStore, NotificationRegistry,
    NotificationStore, PgStore,
};

use herald_api::routes::create_router;
use herald_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("herald_api=info,herald_notifier=info,tower_http=info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!("Starting Herald API server...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Pick the store
    let store: Arc<dyn NotificationStore> = match &config.database_url {
        Some(url) => Arc::new(PgStore::new(
            db::connect(url, config.db_max_connections).await?,
        )),
        None => {
            tracing::warn!("DATABASE_URL not set; notifications are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let registry = Arc::new(NotificationRegistry::new(store));
    registry.restore(chrono::Utc::now()).await?;

    let adapter_timeout = Duration::from_secs(config.adapter_timeout_secs);
    let adapters = AdapterSet::from_credentials(&config.credentials, adapter_timeout)?;
    let engine = Arc::new(
        DeliveryEngine::new(
            registry,
            Formatter::new(config.branding.clone()),
            adapters,
            config.retry.clone(),
        )
        .with_adapter_timeout(adapter_timeout)
        .with_max_in_flight(config.worker_max_in_flight),
    );

    // Start the retry loop
    let shutdown = CancellationToken::new();
    let worker = DeliveryWorker::new(engine.clone())
        .with_scan_interval(Duration::from_secs(config.worker_scan_interval_secs))
        .with_max_in_flight(config.worker_max_in_flight)
        .with_retention(config.retention());
    let worker_handle = tokio::spawn(worker.run(shutdown.clone()));

    // Build router
    let app = create_router(AppState::new(engine));

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received shutdown signal, stopping gracefully...");
                }
                _ = server_shutdown.cancelled() => {}
            }
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "Delivery worker task failed");
    }

    tracing::info!("Herald API server stopped.");
    Ok(())
}
