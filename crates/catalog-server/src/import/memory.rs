//! In-memory collaborators
//!
//! Stand-ins for the object store, queues, catalog store and topic, used by
//! tests. The queue models visibility: received messages
//! stay in flight until acknowledged or until
//! [`MemoryQueue::expire_visibility`] returns them.

use async_trait::async_trait;
use catalog_common::{BatchSummary, CatalogError, CatalogItem, Result};
use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    io,
    pin::Pin,
    sync::atomic::{AtomicUsize, Ordering},
    task::{Context, Poll},
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, ReadBuf},
    sync::Mutex,
};
use uuid::Uuid;

use super::{
    catalog::{CatalogStore, ProductView},
    config::MAX_QUEUE_BATCH,
    notifier::Notifier,
    queue::{OutboundMessage, ReceivedMessage, WorkQueue},
};
use crate::storage::{ObjectReader, ObjectSource};

// ============================================================================
// Object store
// ============================================================================

#[derive(Clone)]
enum StoredObject {
    Complete(Vec<u8>),
    /// Yields the bytes, then fails with an I/O error
    Truncated(Vec<u8>),
}

#[derive(Default)]
pub struct MemoryObjects {
    objects: Mutex<HashMap<(String, String), StoredObject>>,
}

struct BrokenPipe;

impl AsyncRead for BrokenPipe {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        )))
    }
}

impl MemoryObjects {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, bucket: &str, key: &str, bytes: impl Into<Vec<u8>>) {
        self.objects.lock().await.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject::Complete(bytes.into()),
        );
    }

    /// Store an object whose stream breaks after `bytes`.
    pub async fn put_truncated(&self, bucket: &str, key: &str, bytes: impl Into<Vec<u8>>) {
        self.objects.lock().await.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject::Truncated(bytes.into()),
        );
    }
}

#[async_trait]
impl ObjectSource for MemoryObjects {
    async fn open(&self, bucket: &str, key: &str) -> Result<ObjectReader> {
        let object = self
            .objects
            .lock()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned();

        match object {
            Some(StoredObject::Complete(bytes)) => Ok(Box::new(io::Cursor::new(bytes))),
            Some(StoredObject::Truncated(bytes)) => {
                Ok(Box::new(io::Cursor::new(bytes).chain(BrokenPipe)))
            },
            None => Err(CatalogError::InvalidRequest(format!(
                "object s3://{}/{} does not exist",
                bucket, key
            ))),
        }
    }
}

// ============================================================================
// Queue
// ============================================================================

#[derive(Debug, Clone)]
struct StoredMessage {
    message_id: String,
    body: String,
    attributes: BTreeMap<String, String>,
    receive_count: u32,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<StoredMessage>,
    in_flight: HashMap<String, StoredMessage>,
    next_id: u64,
    batch_sizes: Vec<usize>,
}

pub struct MemoryQueue {
    name: String,
    state: Mutex<QueueState>,
    failing_sends: AtomicUsize,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState::default()),
            failing_sends: AtomicUsize::new(0),
        }
    }

    /// Make the next `n` batch sends fail.
    pub fn fail_next_sends(&self, n: usize) {
        self.failing_sends.store(n, Ordering::SeqCst);
    }

    /// Return every in-flight message to the queue, as if its visibility
    /// timeout had expired.
    pub async fn expire_visibility(&self) {
        let mut state = self.state.lock().await;
        let mut expired: Vec<_> = state.in_flight.drain().map(|(_, m)| m).collect();
        expired.sort_by(|a, b| a.message_id.cmp(&b.message_id));
        state.ready.extend(expired);
    }

    /// Messages waiting to be received
    pub async fn ready_bodies(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .ready
            .iter()
            .map(|m| m.body.clone())
            .collect()
    }

    pub async fn ready_len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    /// Size of every accepted send, in order
    pub async fn batch_sizes(&self) -> Vec<usize> {
        self.state.lock().await.batch_sizes.clone()
    }

    /// Enqueue a single message body.
    pub async fn push(&self, message: OutboundMessage) -> Result<()> {
        self.send_batch(std::slice::from_ref(&message)).await
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_batch(&self, messages: &[OutboundMessage]) -> Result<()> {
        if messages.len() > MAX_QUEUE_BATCH {
            return Err(CatalogError::Internal(format!(
                "batch of {} exceeds the queue limit of {}",
                messages.len(),
                MAX_QUEUE_BATCH
            )));
        }

        let failing = self
            .failing_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CatalogError::TransientIo(format!(
                "{}: send rejected",
                self.name
            )));
        }

        let mut state = self.state.lock().await;
        for message in messages {
            state.next_id += 1;
            let message_id = format!("{}-{:06}", self.name, state.next_id);
            state.ready.push_back(StoredMessage {
                message_id,
                body: message.body.clone(),
                attributes: message.attributes.clone(),
                receive_count: 0,
            });
        }
        state.batch_sizes.push(messages.len());
        Ok(())
    }

    async fn receive(&self, max: usize) -> Result<Vec<ReceivedMessage>> {
        let mut state = self.state.lock().await;
        let mut received = Vec::new();

        while received.len() < max.clamp(1, MAX_QUEUE_BATCH) {
            let Some(mut message) = state.ready.pop_front() else {
                break;
            };
            message.receive_count += 1;
            let receipt_handle = format!("{}#{}", message.message_id, message.receive_count);

            received.push(ReceivedMessage {
                message_id: message.message_id.clone(),
                receipt_handle: receipt_handle.clone(),
                body: message.body.clone(),
                attributes: message.attributes.clone(),
                receive_count: message.receive_count,
            });
            state.in_flight.insert(receipt_handle, message);
        }

        Ok(received)
    }

    async fn ack(&self, receipt_handles: &[String]) -> Result<()> {
        let mut state = self.state.lock().await;
        for handle in receipt_handles {
            state.in_flight.remove(handle);
        }
        Ok(())
    }
}

// ============================================================================
// Catalog store
// ============================================================================

#[derive(Default)]
struct CatalogState {
    items: Vec<CatalogItem>,
    stocks: HashMap<Uuid, i64>,
}

#[derive(Default)]
pub struct MemoryCatalog {
    state: Mutex<CatalogState>,
    failing_field: Mutex<Option<(String, String)>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes of records whose `field` equals `value`.
    pub async fn fail_writes_where(&self, field: &str, value: &str) {
        *self.failing_field.lock().await = Some((field.to_string(), value.to_string()));
    }

    pub async fn set_stock(&self, id: Uuid, count: i64) {
        self.state.lock().await.stocks.insert(id, count);
    }

    pub async fn items(&self) -> Vec<CatalogItem> {
        self.state.lock().await.items.clone()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn put_item(&self, item: &CatalogItem) -> Result<()> {
        if let Some((field, value)) = self.failing_field.lock().await.as_ref() {
            if item.attributes.get(field) == Some(value.as_str()) {
                return Err(CatalogError::TransientIo(format!(
                    "catalog store unavailable for {}={}",
                    field, value
                )));
            }
        }

        let mut state = self.state.lock().await;
        match state.items.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => *existing = item.clone(),
            None => state.items.push(item.clone()),
        }
        Ok(())
    }

    async fn get_item(&self, id: Uuid) -> Result<Option<ProductView>> {
        let state = self.state.lock().await;
        Ok(state
            .items
            .iter()
            .find(|item| item.id == id)
            .map(|item| ProductView::new(item.clone(), state.stocks.get(&id).copied().unwrap_or(0))))
    }

    async fn list_items(&self, limit: i64, offset: i64) -> Result<(Vec<ProductView>, i64)> {
        let state = self.state.lock().await;
        let page = state
            .items
            .iter()
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|item| {
                ProductView::new(item.clone(), state.stocks.get(&item.id).copied().unwrap_or(0))
            })
            .collect();
        Ok((page, state.items.len() as i64))
    }
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Default)]
pub struct MemoryNotifier {
    published: Mutex<Vec<BatchSummary>>,
    failing: AtomicUsize,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` publishes fail.
    pub fn fail_next(&self, n: usize) {
        self.failing.store(n, Ordering::SeqCst);
    }

    pub async fn published(&self) -> Vec<BatchSummary> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn publish(&self, summary: &BatchSummary) -> Result<()> {
        let failing = self
            .failing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CatalogError::TransientIo("topic unavailable".to_string()));
        }
        self.published.lock().await.push(summary.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_redelivers_unacked_messages() {
        let queue = MemoryQueue::new("catalog-items");
        queue.push(OutboundMessage::new("{}")).await.unwrap();

        let first = queue.receive(5).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].receive_count, 1);
        assert!(queue.receive(5).await.unwrap().is_empty());

        queue.expire_visibility().await;
        let second = queue.receive(5).await.unwrap();
        assert_eq!(second[0].receive_count, 2);
        assert_eq!(second[0].message_id, first[0].message_id);

        queue.ack(&[second[0].receipt_handle.clone()]).await.unwrap();
        queue.expire_visibility().await;
        assert_eq!(queue.ready_len().await, 0);
    }

    #[tokio::test]
    async fn test_queue_rejects_oversized_batch() {
        let queue = MemoryQueue::new("q");
        let batch = vec![OutboundMessage::new("{}"); 11];
        assert!(queue.send_batch(&batch).await.is_err());
    }

    #[tokio::test]
    async fn test_truncated_object_fails_mid_stream() {
        let objects = MemoryObjects::new();
        objects.put_truncated("b", "k", "sku,name\n").await;

        let mut reader = objects.open("b", "k").await.unwrap();
        let mut buf = Vec::new();
        let err = reader.read_to_end(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(buf, b"sku,name\n");
    }
}
