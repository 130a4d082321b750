//! Asynchronous bulk import pipeline
//!
//! ```text
//! upload ──► object store ──► events queue ──► FileParser ──► catalog queue
//!                                                                  │
//!            topic ◄── BatchProcessor ◄─────────────────────────────┘
//!                            │
//!                            ▼
//!                      catalog store
//! ```
//!
//! Every collaborator sits behind a trait ([`ObjectSource`], [`WorkQueue`],
//! [`CatalogStore`], [`Notifier`]) with an AWS/PostgreSQL implementation and
//! an in-memory one in `memory` (unit tests and the `testing` feature).

pub mod aws;
pub mod catalog;
pub mod config;
pub mod events;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod notifier;
pub mod parser;
pub mod processor;
pub mod queue;
pub mod settle;
pub mod worker;

pub use catalog::{CatalogStore, PgCatalogStore, ProductView};
pub use config::ImportConfig;
pub use notifier::{Notifier, SnsNotifier};
pub use parser::{FileParser, ParseReport, ParserSettings};
pub use processor::{BatchFailure, BatchProcessor, BatchReport, MessageOutcome};
pub use queue::{OutboundMessage, ReceivedMessage, SqsQueue, WorkQueue};
pub use settle::{DeadLetter, Disposition, SettleReport, Settlement};
pub use worker::ImportWorker;

use std::sync::Arc;
use tracing::info;

use crate::storage::ObjectSource;

/// The wired-up pipeline: both stages and the queues between them.
#[derive(Clone)]
pub struct ImportPipeline {
    pub parser: Arc<FileParser>,
    pub processor: Arc<BatchProcessor>,
    /// Upload events (object-created notifications)
    pub events: Arc<dyn WorkQueue>,
    /// One message per parsed row
    pub catalog: Arc<dyn WorkQueue>,
    pub dead_letters: Option<Arc<dyn WorkQueue>>,
    pub batch_size: usize,
    pub max_receive_count: u32,
}

/// Queues, store and topic an [`ImportPipeline`] is assembled from.
pub struct PipelineParts {
    pub objects: Arc<dyn ObjectSource>,
    pub events: Arc<dyn WorkQueue>,
    pub catalog: Arc<dyn WorkQueue>,
    pub dead_letters: Option<Arc<dyn WorkQueue>>,
    pub store: Arc<dyn CatalogStore>,
    pub notifier: Arc<dyn Notifier>,
}

impl ImportPipeline {
    pub fn new(config: &ImportConfig, parts: PipelineParts) -> Self {
        let parser = FileParser::new(
            parts.objects,
            Arc::clone(&parts.catalog),
            ParserSettings::from(config),
        );
        let processor = BatchProcessor::new(parts.store, parts.notifier, config.id_strategy);

        Self {
            parser: Arc::new(parser),
            processor: Arc::new(processor),
            events: parts.events,
            catalog: parts.catalog,
            dead_letters: parts.dead_letters,
            batch_size: config.batch_size,
            max_receive_count: config.max_receive_count,
        }
    }

    /// Build the pipeline against SQS and SNS.
    pub async fn connect(
        config: &ImportConfig,
        objects: Arc<dyn ObjectSource>,
        store: Arc<dyn CatalogStore>,
    ) -> anyhow::Result<Self> {
        let (catalog_url, events_url, topic_arn) = config.require_endpoints()?;

        let sdk_config = aws::load_sdk_config(&config.aws).await;
        let sqs = aws::sqs_client(&sdk_config);
        let sns = aws::sns_client(&sdk_config);

        let queue = |url: &str| -> Arc<dyn WorkQueue> {
            Arc::new(
                SqsQueue::new(sqs.clone(), url)
                    .with_wait_time(config.wait_time_secs)
                    .with_visibility_timeout(config.visibility_timeout_secs),
            )
        };

        let parts = PipelineParts {
            objects,
            events: queue(events_url),
            catalog: queue(catalog_url),
            dead_letters: config.dead_letter_queue_url.as_deref().map(queue),
            store,
            notifier: Arc::new(SnsNotifier::new(sns, topic_arn)),
        };

        info!(
            catalog_queue = catalog_url,
            events_queue = events_url,
            dead_letters = parts.dead_letters.is_some(),
            id_strategy = %config.id_strategy,
            "Import pipeline connected"
        );

        Ok(Self::new(config, parts))
    }
}
