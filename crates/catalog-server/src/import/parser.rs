//! File parser
//!
//! Streams an uploaded CSV object, turns every data row into a [`QueueMessage`]
//! and sends them to the catalog items queue in batches. Sends overlap with
//! decoding but are bounded by `max_in_flight_sends`; the object counts as
//! parsed only once every send has been confirmed.
//!
//! Rows with the wrong number of cells or invalid UTF-8 are logged and
//! skipped. A failing byte stream aborts the object with a retryable error.

use catalog_common::{CatalogError, QueueMessage, RawRecord, Result, SourceRow};
use csv_async::{AsyncReaderBuilder, ErrorKind, StringRecord};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::{
    config::{in_inbox, ImportConfig, MAX_QUEUE_BATCH},
    events::{parse_notification, ObjectEvent},
    queue::{OutboundMessage, WorkQueue},
};
use crate::storage::ObjectSource;

#[derive(Debug, Clone)]
pub struct ParserSettings {
    pub inbox_prefix: String,
    pub enqueue_batch_size: usize,
    pub max_in_flight_sends: usize,
}

impl Default for ParserSettings {
    fn default() -> Self {
        ParserSettings::from(&ImportConfig::default())
    }
}

impl From<&ImportConfig> for ParserSettings {
    fn from(config: &ImportConfig) -> Self {
        Self {
            inbox_prefix: config.inbox_prefix.clone(),
            enqueue_batch_size: config.enqueue_batch_size.clamp(1, MAX_QUEUE_BATCH),
            max_in_flight_sends: config.max_in_flight_sends.max(1),
        }
    }
}

/// Result of parsing one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseReport {
    pub bucket: String,
    pub key: String,
    /// Rows confirmed on the queue
    pub enqueued: u64,
    /// Malformed rows that were dropped
    pub skipped: u64,
}

pub struct FileParser {
    objects: Arc<dyn ObjectSource>,
    queue: Arc<dyn WorkQueue>,
    settings: ParserSettings,
}

async fn send_owned(queue: Arc<dyn WorkQueue>, batch: Vec<OutboundMessage>) -> Result<usize> {
    queue.send_batch(&batch).await.map(|()| batch.len())
}

impl FileParser {
    pub fn new(
        objects: Arc<dyn ObjectSource>,
        queue: Arc<dyn WorkQueue>,
        settings: ParserSettings,
    ) -> Self {
        Self {
            objects,
            queue,
            settings,
        }
    }

    /// Handle one upload events message.
    ///
    /// Every record is attempted even if an earlier one failed. When any record
    /// fails, a retryable error is preferred so the message gets redelivered.
    #[instrument(skip(self, body))]
    pub async fn handle_notification(&self, body: &str) -> Result<Vec<ParseReport>> {
        let events = parse_notification(body)?;
        if events.is_empty() {
            debug!("Notification carries no records");
        }

        let mut reports = Vec::new();
        let mut failure: Option<CatalogError> = None;

        for event in events {
            if !self.should_parse(&event) {
                continue;
            }

            match self
                .parse_object(&event.bucket, &event.key, event.version.as_deref())
                .await
            {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!(bucket = %event.bucket, key = %event.key, kind = e.kind(), "Failed to parse object: {}", e);
                    let replace = match &failure {
                        None => true,
                        Some(current) => !current.is_retryable() && e.is_retryable(),
                    };
                    if replace {
                        failure = Some(e);
                    }
                },
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(reports),
        }
    }

    fn should_parse(&self, event: &ObjectEvent) -> bool {
        if !event.is_object_created() {
            debug!(event = %event.event_name, key = %event.key, "Skipping non-creation event");
            return false;
        }
        if !in_inbox(&self.settings.inbox_prefix, &event.key) {
            debug!(key = %event.key, prefix = %self.settings.inbox_prefix, "Skipping key outside inbox");
            return false;
        }
        true
    }

    /// Stream one object and enqueue a message per data row.
    #[instrument(skip(self))]
    pub async fn parse_object(
        &self,
        bucket: &str,
        key: &str,
        version: Option<&str>,
    ) -> Result<ParseReport> {
        let reader = self.objects.open(bucket, key).await?;
        let mut csv = AsyncReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .create_reader(reader);

        let headers = match csv.headers().await {
            Ok(headers) if !headers.is_empty() => headers.clone(),
            Ok(_) => {
                return Err(CatalogError::RecordDecode(format!(
                    "s3://{}/{} has no header row",
                    bucket, key
                )))
            },
            Err(e) => return Err(classify_header_error(e, bucket, key)),
        };

        let mut report = ParseReport {
            bucket: bucket.to_string(),
            key: key.to_string(),
            enqueued: 0,
            skipped: 0,
        };

        let mut pending: Vec<OutboundMessage> = Vec::with_capacity(self.settings.enqueue_batch_size);
        let mut in_flight = FuturesUnordered::new();
        let mut record = StringRecord::new();
        let mut row: u64 = 0;

        loop {
            match csv.read_record(&mut record).await {
                Ok(true) => {},
                Ok(false) => break,
                Err(e) => match e.kind() {
                    ErrorKind::UnequalLengths { .. } | ErrorKind::Utf8 { .. } => {
                        row += 1;
                        report.skipped += 1;
                        warn!(bucket, key, row, "Skipping malformed row: {}", e);
                        continue;
                    },
                    _ => {
                        return Err(CatalogError::TransientIo(format!(
                            "reading s3://{}/{} failed after row {}: {}",
                            bucket, key, row, e
                        )))
                    },
                },
            }
            row += 1;

            let message = QueueMessage::new(RawRecord::from_row(headers.iter(), record.iter()))
                .with_source(SourceRow {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    version: version.map(str::to_string),
                    row,
                });
            pending.push(OutboundMessage::from_queue_message(&message)?);

            if pending.len() >= self.settings.enqueue_batch_size {
                let batch = std::mem::replace(
                    &mut pending,
                    Vec::with_capacity(self.settings.enqueue_batch_size),
                );
                in_flight.push(send_owned(Arc::clone(&self.queue), batch));

                while in_flight.len() >= self.settings.max_in_flight_sends {
                    if let Some(sent) = in_flight.next().await {
                        report.enqueued += sent? as u64;
                    }
                }
            }
        }

        if !pending.is_empty() {
            in_flight.push(send_owned(Arc::clone(&self.queue), pending));
        }
        while let Some(sent) = in_flight.next().await {
            report.enqueued += sent? as u64;
        }

        info!(
            bucket,
            key,
            rows = report.enqueued,
            skipped = report.skipped,
            "Parsed object"
        );
        Ok(report)
    }
}

fn classify_header_error(e: csv_async::Error, bucket: &str, key: &str) -> CatalogError {
    match e.kind() {
        ErrorKind::Io(_) => {
            CatalogError::TransientIo(format!("reading s3://{}/{} failed: {}", bucket, key, e))
        },
        _ => CatalogError::RecordDecode(format!(
            "s3://{}/{} has an undecodable header row: {}",
            bucket, key, e
        )),
    }
}
