//! Completion notifications

use async_trait::async_trait;
use aws_sdk_sns::{types::MessageAttributeValue, Client};
use catalog_common::{BatchSummary, CatalogError, Result};
use tracing::{info, instrument};

/// Subject line of the completion notification.
pub const NOTIFICATION_SUBJECT: &str = "Products Created";

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, summary: &BatchSummary) -> Result<()>;
}

/// Publishes batch summaries to an SNS topic
pub struct SnsNotifier {
    client: Client,
    topic_arn: String,
}

impl SnsNotifier {
    pub fn new(client: Client, topic_arn: impl Into<String>) -> Self {
        Self {
            client,
            topic_arn: topic_arn.into(),
        }
    }
}

#[async_trait]
impl Notifier for SnsNotifier {
    #[instrument(skip(self, summary), fields(count = summary.count))]
    async fn publish(&self, summary: &BatchSummary) -> Result<()> {
        let message = serde_json::to_string(summary)?;

        // Lets subscribers filter on batch size.
        let count = MessageAttributeValue::builder()
            .data_type("Number")
            .string_value(summary.count.to_string())
            .build()
            .map_err(|e| CatalogError::Internal(format!("Failed to build SNS attribute: {}", e)))?;

        let output = self
            .client
            .publish()
            .topic_arn(&self.topic_arn)
            .subject(NOTIFICATION_SUBJECT)
            .message(message)
            .message_attributes("count", count)
            .send()
            .await
            .map_err(|e| CatalogError::TransientIo(format!("SNS publish failed: {}", e)))?;

        info!(
            message_id = output.message_id().unwrap_or_default(),
            "Published completion notification"
        );
        Ok(())
    }
}
