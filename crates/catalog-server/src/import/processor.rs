//! Batch processor
//!
//! Turns a batch of catalog item messages into stored catalog items and
//! publishes one completion notification per batch.

use catalog_common::{
    BatchSummary, CatalogError, CatalogItem, IdStrategy, QueueMessage, Result,
    ATTR_IDEMPOTENCY_KEY,
};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{catalog::CatalogStore, notifier::Notifier, queue::ReceivedMessage};

/// What happened to one message of a batch.
#[derive(Debug)]
pub enum MessageOutcome {
    Written(CatalogItem),
    Failed(CatalogError),
}

impl MessageOutcome {
    pub fn error(&self) -> Option<&CatalogError> {
        match self {
            MessageOutcome::Written(_) => None,
            MessageOutcome::Failed(e) => Some(e),
        }
    }
}

/// Outcomes in the order of the input batch, plus the published summary.
#[derive(Debug)]
pub struct BatchReport {
    pub outcomes: Vec<MessageOutcome>,
    pub summary: Option<BatchSummary>,
}

impl BatchReport {
    pub fn written(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, MessageOutcome::Written(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.written()
    }
}

/// The completion notification could not be published.
///
/// Carries the per-message outcomes so that settlement can keep each failed
/// message's own error.
#[derive(Debug, thiserror::Error)]
#[error("Batch notification failed: {error}")]
pub struct BatchFailure {
    pub outcomes: Vec<MessageOutcome>,
    pub error: CatalogError,
}

impl BatchFailure {
    /// The error to settle each message with: its own failure, or the publish
    /// failure for messages that were written.
    pub fn errors(&self) -> impl Iterator<Item = &CatalogError> {
        self.outcomes
            .iter()
            .map(|outcome| outcome.error().unwrap_or(&self.error))
    }
}

pub struct BatchProcessor {
    store: Arc<dyn CatalogStore>,
    notifier: Arc<dyn Notifier>,
    id_strategy: IdStrategy,
}

impl BatchProcessor {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        notifier: Arc<dyn Notifier>,
        id_strategy: IdStrategy,
    ) -> Self {
        Self {
            store,
            notifier,
            id_strategy,
        }
    }

    pub fn id_strategy(&self) -> IdStrategy {
        self.id_strategy
    }

    /// Process every message concurrently, then publish once if anything was
    /// written.
    ///
    /// Per-message failures are reported in the outcomes. Only a failed publish
    /// fails the call, in which case no written message should be acknowledged.
    #[instrument(skip(self, batch), fields(size = batch.len()))]
    pub async fn process(
        &self,
        batch: &[ReceivedMessage],
    ) -> std::result::Result<BatchReport, BatchFailure> {
        let outcomes: Vec<MessageOutcome> =
            join_all(batch.iter().map(|message| self.process_one(message)))
                .await
                .into_iter()
                .zip(batch)
                .map(|(result, message)| match result {
                    Ok(item) => MessageOutcome::Written(item),
                    Err(e) => {
                        warn!(
                            message_id = %message.message_id,
                            kind = e.kind(),
                            "Failed to process message: {}",
                            e
                        );
                        MessageOutcome::Failed(e)
                    },
                })
                .collect();

        let written: Vec<CatalogItem> = outcomes
            .iter()
            .filter_map(|o| match o {
                MessageOutcome::Written(item) => Some(item.clone()),
                MessageOutcome::Failed(_) => None,
            })
            .collect();

        let summary = if written.is_empty() {
            None
        } else {
            let summary = BatchSummary::new(written);
            if let Err(error) = self.notifier.publish(&summary).await {
                return Err(BatchFailure { outcomes, error });
            }
            Some(summary)
        };

        let report = BatchReport { outcomes, summary };
        info!(
            written = report.written(),
            failed = report.failed(),
            "Processed batch"
        );
        Ok(report)
    }

    async fn process_one(&self, message: &ReceivedMessage) -> Result<CatalogItem> {
        let record = QueueMessage::decode_body(&message.body)?;
        let id = self
            .id_strategy
            .mint(message.attribute(ATTR_IDEMPOTENCY_KEY), &record)?;
        let item = CatalogItem::new(id, record);
        self.store.put_item(&item).await?;
        Ok(item)
    }
}
