//! Catalog Server - Main entry point

use anyhow::Result;
use catalog_common::logging::{init_logging, LogConfig};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use catalog_server::{
    api,
    config::Config,
    features::{self, imports::ImportsState, imports::UploadSettings},
    import::{CatalogStore, ImportConfig, ImportPipeline, ImportWorker, PgCatalogStore},
    storage::{config::StorageConfig, Storage},
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::builder()
        .log_file_prefix("catalog-server".to_string())
        .filter_directives("catalog_server=debug,tower_http=debug,sqlx=info,aws_config=warn".to_string())
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting Catalog Server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let import_config = ImportConfig::from_env()?;

    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.database.idle_timeout_secs))
        .connect(&config.database.url)
        .await?;

    info!("Database connection pool established");

    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

    info!("Database migrations completed");

    let storage = Storage::new(StorageConfig::from_env()?).await?;
    let catalog: Arc<dyn CatalogStore> = Arc::new(PgCatalogStore::new(db_pool));

    let cancel = CancellationToken::new();

    let worker_handle = if import_config.enabled {
        let pipeline =
            ImportPipeline::connect(&import_config, Arc::new(storage.clone()), Arc::clone(&catalog))
                .await?;
        let worker = ImportWorker::new(pipeline, import_config.idle_backoff());
        info!("Import worker starting");
        Some(worker.start(cancel.clone()))
    } else {
        info!("Import consumers are disabled (IMPORT_ENABLED=false)");
        None
    };

    let state = features::FeatureState {
        catalog,
        imports: ImportsState {
            signer: Arc::new(storage),
            settings: UploadSettings {
                inbox_prefix: import_config.inbox_prefix.clone(),
                ttl: import_config.upload_ttl(),
            },
        },
    };

    let app = api::create_router(state, &config.cors);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    if let Some(handle) = worker_handle {
        let timeout = Duration::from_secs(config.server.shutdown_timeout_secs);
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => info!("Import worker stopped"),
            Ok(Err(e)) => tracing::error!("Import worker panicked: {}", e),
            Err(_) => tracing::warn!("Import worker did not stop within {:?}", timeout),
        }
    }

    info!("Server shut down gracefully");

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM and cancels the background workers.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    cancel.cancel();
}
