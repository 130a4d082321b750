//! Per-message settlement
//!
//! After an invocation every received message is acknowledged, left for
//! redelivery, or moved to the dead-letter queue:
//!
//! | outcome                              | action                      |
//! |--------------------------------------|-----------------------------|
//! | success                              | delete                      |
//! | non-retryable error (e.g. decode)    | dead-letter, then delete    |
//! | retryable, below `max_receive_count` | leave; redelivered later    |
//! | retryable, at `max_receive_count`    | dead-letter, then delete    |
//!
//! Without a dead-letter queue, messages that should be dead-lettered stay on
//! the source queue.

use catalog_common::{CatalogError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{error, info, warn};

use super::queue::{OutboundMessage, ReceivedMessage, WorkQueue};

/// What to do with one received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Retry,
    DeadLetter,
}

impl Disposition {
    pub fn decide(error: Option<&CatalogError>, receive_count: u32, max_receive_count: u32) -> Self {
        match error {
            None => Disposition::Ack,
            Some(e) if !e.is_retryable() => Disposition::DeadLetter,
            Some(_) if receive_count >= max_receive_count => Disposition::DeadLetter,
            Some(_) => Disposition::Retry,
        }
    }
}

/// Body of a dead-lettered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub source_queue: String,
    pub message_id: String,
    pub body: String,
    pub attributes: BTreeMap<String, String>,
    pub receive_count: u32,
    /// Error kind, e.g. `RecordDecodeError`
    pub reason: String,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(source_queue: &str, message: &ReceivedMessage, error: &CatalogError) -> Self {
        Self {
            source_queue: source_queue.to_string(),
            message_id: message.message_id.clone(),
            body: message.body.clone(),
            attributes: message.attributes.clone(),
            receive_count: message.receive_count,
            reason: error.kind().to_string(),
            error: error.to_string(),
            failed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SettleReport {
    pub acked: usize,
    pub retried: usize,
    pub dead_lettered: usize,
}

/// Settles messages received from one queue.
#[derive(Clone)]
pub struct Settlement {
    queue: Arc<dyn WorkQueue>,
    dead_letters: Option<Arc<dyn WorkQueue>>,
    max_receive_count: u32,
}

impl Settlement {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        dead_letters: Option<Arc<dyn WorkQueue>>,
        max_receive_count: u32,
    ) -> Self {
        Self {
            queue,
            dead_letters,
            max_receive_count,
        }
    }

    /// Apply the settlement policy to `(message, error)` pairs. Messages whose
    /// dead-letter send fails are left on the queue.
    pub async fn settle(
        &self,
        outcomes: &[(&ReceivedMessage, Option<&CatalogError>)],
    ) -> Result<SettleReport> {
        let mut report = SettleReport::default();
        let mut delete = Vec::new();

        for (message, error) in outcomes {
            match Disposition::decide(*error, message.receive_count, self.max_receive_count) {
                Disposition::Ack => delete.push(message.receipt_handle.clone()),
                Disposition::Retry => report.retried += 1,
                Disposition::DeadLetter => {
                    let Some(error) = error else { continue };
                    if self.dead_letter(message, error).await {
                        delete.push(message.receipt_handle.clone());
                        report.dead_lettered += 1;
                    } else {
                        report.retried += 1;
                    }
                },
            }
        }

        report.acked = delete.len() - report.dead_lettered;
        self.queue.ack(&delete).await?;

        Ok(report)
    }

    async fn dead_letter(&self, message: &ReceivedMessage, error: &CatalogError) -> bool {
        let Some(dead_letters) = &self.dead_letters else {
            warn!(
                queue = %self.queue.name(),
                message_id = %message.message_id,
                receive_count = message.receive_count,
                reason = error.kind(),
                "No dead-letter queue configured, leaving failed message on the queue"
            );
            return false;
        };

        let envelope = DeadLetter::new(self.queue.name(), message, error);
        let body = match serde_json::to_string(&envelope) {
            Ok(body) => body,
            Err(e) => {
                error!(message_id = %message.message_id, "Failed to encode dead letter: {}", e);
                return false;
            },
        };

        let outbound = OutboundMessage {
            body,
            attributes: message.attributes.clone(),
        };

        match dead_letters.send_batch(std::slice::from_ref(&outbound)).await {
            Ok(()) => {
                info!(
                    queue = %self.queue.name(),
                    message_id = %message.message_id,
                    reason = error.kind(),
                    "Moved message to dead-letter queue: {}",
                    error
                );
                true
            },
            Err(e) => {
                error!(
                    message_id = %message.message_id,
                    "Failed to dead-letter message: {}",
                    e
                );
                false
            },
        }
    }
}
