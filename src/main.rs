use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use beacon::api::{self, AppState};
use beacon::config::{Config, DatabaseBackend};
use beacon::enrichment::{EnrichmentPipeline, GeoIpService};
use beacon::ingest::{IngestionQueue, Ingestor, WorkerPool};
use beacon::network::NetworkIntelligence;
use beacon::privacy::{PrivacyGuard, SettingsSource};
use beacon::storage::{PostgresStorage, SqliteStorage, Storage, StorageGateway, StorageSettings};
use beacon::tasks::BackgroundTasks;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    let storage: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.database.url);
            Arc::new(SqliteStorage::new(&config.database.url, config.database.max_connections).await?)
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage: {}", config.database.url);
            Arc::new(
                PostgresStorage::new(&config.database.url, config.database.max_connections)
                    .await?,
            )
        }
    };

    info!("Initializing database...");
    storage.init().await?;
    info!("Database initialized successfully");

    let settings: Arc<dyn SettingsSource> = Arc::new(StorageSettings::new(Arc::clone(&storage)));
    let privacy = Arc::new(PrivacyGuard::from_config(&config.privacy, Some(settings)));
    if privacy.is_enabled().await {
        info!("Privacy mode is on: client IPs are hashed before enrichment");
    }

    let network = Arc::new(NetworkIntelligence::from_config(&config.enrichment));
    let geoip = match GeoIpService::new(config.enrichment.geoip_city_db_path.as_deref()) {
        Ok(service) => service,
        Err(e) => {
            warn!("GeoIP disabled: {:#}", e);
            GeoIpService::default()
        }
    };

    let pipeline = Arc::new(EnrichmentPipeline::new(geoip, Arc::clone(&network)));
    let gateway = Arc::new(StorageGateway::new(Arc::clone(&storage)));
    let queue = Arc::new(IngestionQueue::new(config.ingest.queue_capacity));
    let workers = WorkerPool::start(
        Arc::clone(&queue),
        pipeline,
        gateway,
        config.ingest.workers,
    );
    info!(
        "Ingestion queue capacity {}, {} workers",
        queue.capacity(),
        workers.size()
    );

    let mut tasks = BackgroundTasks::new();
    tasks.spawn_retention(
        Arc::clone(&storage),
        config.retention.days,
        config.retention.interval_secs,
    );
    tasks.spawn_blacklist_refresh(
        Arc::clone(&network),
        config.enrichment.isp_blacklist_refresh_secs,
    );

    let state = Arc::new(AppState {
        ingestor: Arc::new(Ingestor::new(Arc::clone(&queue), privacy)),
        storage: Arc::clone(&storage),
        network: config.network.clone(),
        privacy_header: config.privacy.override_header.clone(),
    });
    let router = api::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Collector listening on http://{}", addr);
    info!("   - POST http://{}/collect", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("HTTP server stopped, draining ingestion queue...");
    workers.shutdown().await;
    tasks.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
