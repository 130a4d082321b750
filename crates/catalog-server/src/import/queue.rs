//! Work queue abstraction and its SQS implementation

use async_trait::async_trait;
use aws_sdk_sqs::{
    types::{
        DeleteMessageBatchRequestEntry, MessageAttributeValue, MessageSystemAttributeName,
        SendMessageBatchRequestEntry,
    },
    Client,
};
use catalog_common::{CatalogError, QueueMessage, Result};
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};

use super::config::MAX_QUEUE_BATCH;

/// A message about to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub body: String,
    pub attributes: BTreeMap<String, String>,
}

impl OutboundMessage {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn from_queue_message(message: &QueueMessage) -> Result<Self> {
        Ok(Self {
            body: message.encode_body()?,
            attributes: message.attributes(),
        })
    }
}

/// A message received from a queue and not yet settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_id: String,
    /// Handle used to delete the message; changes on every delivery
    pub receipt_handle: String,
    pub body: String,
    pub attributes: BTreeMap<String, String>,
    /// Deliveries so far, including this one
    pub receive_count: u32,
}

impl ReceivedMessage {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Durable at-least-once queue.
///
/// Received messages stay invisible for the queue's visibility timeout and are
/// redelivered unless acknowledged before it expires.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Short name used in logs and dead-letter envelopes.
    fn name(&self) -> &str;

    /// Send up to [`MAX_QUEUE_BATCH`] messages in one call. Succeeds only if
    /// every entry was accepted.
    async fn send_batch(&self, messages: &[OutboundMessage]) -> Result<()>;

    async fn receive(&self, max: usize) -> Result<Vec<ReceivedMessage>>;

    /// Delete settled messages by receipt handle.
    async fn ack(&self, receipt_handles: &[String]) -> Result<()>;
}

/// SQS-backed work queue
pub struct SqsQueue {
    client: Client,
    queue_url: String,
    name: String,
    wait_time_secs: i32,
    visibility_timeout_secs: i32,
}

impl SqsQueue {
    pub fn new(client: Client, queue_url: impl Into<String>) -> Self {
        let queue_url = queue_url.into();
        let name = queue_url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("queue")
            .to_string();
        Self {
            client,
            queue_url,
            name,
            wait_time_secs: super::config::DEFAULT_WAIT_TIME_SECS,
            visibility_timeout_secs: super::config::DEFAULT_VISIBILITY_TIMEOUT_SECS,
        }
    }

    pub fn with_wait_time(mut self, seconds: i32) -> Self {
        self.wait_time_secs = seconds.clamp(0, 20);
        self
    }

    pub fn with_visibility_timeout(mut self, seconds: i32) -> Self {
        self.visibility_timeout_secs = seconds.max(0);
        self
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }
}

fn string_attribute(value: &str) -> Result<MessageAttributeValue> {
    MessageAttributeValue::builder()
        .data_type("String")
        .string_value(value)
        .build()
        .map_err(|e| CatalogError::Internal(format!("Failed to build message attribute: {}", e)))
}

#[async_trait]
impl WorkQueue for SqsQueue {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, messages), fields(queue = %self.name, count = messages.len()))]
    async fn send_batch(&self, messages: &[OutboundMessage]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        if messages.len() > MAX_QUEUE_BATCH {
            return Err(CatalogError::Internal(format!(
                "batch of {} exceeds the queue limit of {}",
                messages.len(),
                MAX_QUEUE_BATCH
            )));
        }

        let mut entries = Vec::with_capacity(messages.len());
        for (i, message) in messages.iter().enumerate() {
            let mut entry = SendMessageBatchRequestEntry::builder()
                .id(format!("msg-{}", i))
                .message_body(&message.body);
            for (name, value) in &message.attributes {
                entry = entry.message_attributes(name, string_attribute(value)?);
            }
            entries.push(entry.build().map_err(|e| {
                CatalogError::Internal(format!("Failed to build SQS entry: {}", e))
            })?);
        }

        let result = self
            .client
            .send_message_batch()
            .queue_url(&self.queue_url)
            .set_entries(Some(entries))
            .send()
            .await
            .map_err(|e| CatalogError::TransientIo(format!("SQS batch send failed: {}", e)))?;

        let failed = result.failed();
        if !failed.is_empty() {
            let codes: Vec<_> = failed.iter().map(|f| f.code()).collect();
            return Err(CatalogError::TransientIo(format!(
                "{} of {} SQS entries rejected: {:?}",
                failed.len(),
                messages.len(),
                codes
            )));
        }

        debug!("Sent SQS batch");
        Ok(())
    }

    async fn receive(&self, max: usize) -> Result<Vec<ReceivedMessage>> {
        let max = max.clamp(1, MAX_QUEUE_BATCH) as i32;

        let response = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max)
            .wait_time_seconds(self.wait_time_secs)
            .visibility_timeout(self.visibility_timeout_secs)
            .message_attribute_names("All")
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .send()
            .await
            .map_err(|e| CatalogError::TransientIo(format!("SQS receive failed: {}", e)))?;

        let messages: Vec<_> = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|msg| {
                let Some(receipt_handle) = msg.receipt_handle else {
                    warn!(queue = %self.name, "Received message without receipt handle");
                    return None;
                };

                let receive_count = msg
                    .attributes
                    .as_ref()
                    .and_then(|attrs| attrs.get(&MessageSystemAttributeName::ApproximateReceiveCount))
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1);

                let attributes = msg
                    .message_attributes
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|(name, value)| value.string_value.map(|v| (name, v)))
                    .collect();

                Some(ReceivedMessage {
                    message_id: msg.message_id.unwrap_or_default(),
                    receipt_handle,
                    body: msg.body.unwrap_or_default(),
                    attributes,
                    receive_count,
                })
            })
            .collect();

        debug!(queue = %self.name, count = messages.len(), "Received SQS messages");
        Ok(messages)
    }

    async fn ack(&self, receipt_handles: &[String]) -> Result<()> {
        for chunk in receipt_handles.chunks(MAX_QUEUE_BATCH) {
            let entries = chunk
                .iter()
                .enumerate()
                .map(|(i, handle)| {
                    DeleteMessageBatchRequestEntry::builder()
                        .id(i.to_string())
                        .receipt_handle(handle)
                        .build()
                        .map_err(|e| {
                            CatalogError::Internal(format!("Failed to build delete entry: {}", e))
                        })
                })
                .collect::<Result<Vec<_>>>()?;

            let result = self
                .client
                .delete_message_batch()
                .queue_url(&self.queue_url)
                .set_entries(Some(entries))
                .send()
                .await
                .map_err(|e| CatalogError::TransientIo(format!("SQS batch delete failed: {}", e)))?;

            for f in result.failed() {
                warn!(
                    queue = %self.name,
                    "Failed to delete message {}: {}",
                    f.id(),
                    f.message().unwrap_or("unknown")
                );
            }
        }

        debug!(queue = %self.name, count = receipt_handles.len(), "Acknowledged messages");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use catalog_common::{RawRecord, SourceRow, ATTR_IDEMPOTENCY_KEY};

    #[test]
    fn test_outbound_from_queue_message() {
        let message = QueueMessage::new(RawRecord::from_row(["sku", "name"], ["A1", "Widget"]))
            .with_source(SourceRow {
                bucket: "imports".into(),
                key: "uploaded/products.csv".into(),
                version: None,
                row: 1,
            });

        let outbound = OutboundMessage::from_queue_message(&message).unwrap_or_else(|_| OutboundMessage::new(""));
        assert_eq!(outbound.body, r#"{"name":"Widget","sku":"A1"}"#);
        assert!(outbound.attributes.contains_key(ATTR_IDEMPOTENCY_KEY));
    }

    #[test]
    fn test_queue_name_from_url() {
        let config = aws_sdk_sqs::Config::builder()
            .behavior_version(aws_sdk_sqs::config::BehaviorVersion::latest())
            .region(aws_sdk_sqs::config::Region::new("us-east-1"))
            .build();
        let queue = SqsQueue::new(
            Client::from_conf(config),
            "http://localhost:4566/000000000000/catalog-items",
        )
        .with_wait_time(100);
        assert_eq!(queue.name(), "catalog-items");
        assert_eq!(queue.wait_time_secs, 20);
    }
}
