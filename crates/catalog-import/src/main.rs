//! Catalog Import - operator tool for the bulk import pipeline
//!
//! Runs single pipeline steps against the configured bucket, queues and
//! catalog store without starting the HTTP server.

use anyhow::{Context, Result};
use catalog_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use catalog_server::{
    config::Config,
    import::{CatalogStore, ImportConfig, ImportPipeline, ImportWorker, PgCatalogStore, SettleReport},
    storage::{config::StorageConfig, Storage},
};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "catalog-import")]
#[command(author, version, about = "Catalog bulk import tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Parse one uploaded object and enqueue its rows
    Parse {
        /// Bucket holding the object (defaults to S3_BUCKET)
        #[arg(short, long, env = "S3_BUCKET")]
        bucket: String,

        /// Object key, e.g. uploaded/products.csv
        #[arg(short, long)]
        key: String,

        /// Object version or ETag used for the row idempotency keys
        #[arg(long)]
        object_version: Option<String>,
    },

    /// Re-run the file parser on a saved object-created notification
    Replay {
        /// File containing the notification body (S3 event or SNS envelope)
        #[arg(short, long)]
        event: PathBuf,
    },

    /// Process batches from the catalog items queue until it is empty
    Drain {
        /// Stop after this many batches
        #[arg(short, long, default_value_t = 100)]
        batches: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .output(LogOutput::Console)
        .log_file_prefix("catalog-import")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    let pipeline = connect().await?;

    match cli.command {
        Command::Parse {
            bucket,
            key,
            object_version,
        } => {
            let report = pipeline
                .parser
                .parse_object(&bucket, &key, object_version.as_deref())
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        },
        Command::Replay { event } => {
            let body = tokio::fs::read_to_string(&event)
                .await
                .with_context(|| format!("reading {}", event.display()))?;
            let reports = pipeline.parser.handle_notification(&body).await?;
            println!("{}", serde_json::to_string_pretty(&reports)?);
        },
        Command::Drain { batches } => {
            let worker = ImportWorker::new(pipeline, Duration::ZERO);
            let mut total = SettleReport::default();

            for batch in 0..batches {
                let report = worker.poll_catalog_once().await?;
                if report == SettleReport::default() {
                    info!(batches = batch, "Catalog queue is empty");
                    break;
                }
                total.acked += report.acked;
                total.retried += report.retried;
                total.dead_lettered += report.dead_lettered;
            }

            println!("{}", serde_json::to_string_pretty(&total)?);
        },
    }

    Ok(())
}

/// Wire the pipeline from the same environment the server reads.
///
/// The pool connects lazily, so steps that never touch the catalog store run
/// without a database.
async fn connect() -> Result<ImportPipeline> {
    let config = Config::load()?;
    let import_config = ImportConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .connect_lazy(&config.database.url)?;
    let store: Arc<dyn CatalogStore> = Arc::new(PgCatalogStore::new(pool));

    let storage = Storage::new(StorageConfig::from_env()?).await?;

    ImportPipeline::connect(&import_config, Arc::new(storage), store).await
}
