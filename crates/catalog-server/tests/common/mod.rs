//! Shared fixtures for catalog server integration tests
//!
//! Wires the import pipeline against the in-memory collaborators so tests can
//! inspect every queue, the catalog and the published notifications.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use catalog_server::import::{
    memory::{MemoryCatalog, MemoryNotifier, MemoryObjects, MemoryQueue},
    CatalogStore, ImportConfig, ImportPipeline, ImportWorker, Notifier, WorkQueue,
};
use catalog_server::{import::PipelineParts, storage::UploadSigner};
use serde_json::json;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

pub const BUCKET: &str = "catalog-imports";

pub struct Harness {
    pub objects: Arc<MemoryObjects>,
    pub events: Arc<MemoryQueue>,
    pub catalog_queue: Arc<MemoryQueue>,
    pub dead_letters: Option<Arc<MemoryQueue>>,
    pub store: Arc<MemoryCatalog>,
    pub notifier: Arc<MemoryNotifier>,
    pub pipeline: ImportPipeline,
    pub worker: ImportWorker,
}

impl Harness {
    pub fn new(config: ImportConfig) -> Self {
        Self::build(config, true)
    }

    pub fn without_dead_letters(config: ImportConfig) -> Self {
        Self::build(config, false)
    }

    fn build(config: ImportConfig, with_dead_letters: bool) -> Self {
        let objects = Arc::new(MemoryObjects::new());
        let events = Arc::new(MemoryQueue::new("upload-events"));
        let catalog_queue = Arc::new(MemoryQueue::new("catalog-items"));
        let dead_letters = with_dead_letters.then(|| Arc::new(MemoryQueue::new("dead-letters")));
        let store = Arc::new(MemoryCatalog::new());
        let notifier = Arc::new(MemoryNotifier::new());

        let pipeline = ImportPipeline::new(
            &config,
            PipelineParts {
                objects: objects.clone(),
                events: events.clone() as Arc<dyn WorkQueue>,
                catalog: catalog_queue.clone() as Arc<dyn WorkQueue>,
                dead_letters: dead_letters
                    .clone()
                    .map(|queue| queue as Arc<dyn WorkQueue>),
                store: store.clone() as Arc<dyn CatalogStore>,
                notifier: notifier.clone() as Arc<dyn Notifier>,
            },
        );
        let worker = ImportWorker::new(pipeline.clone(), Duration::from_millis(10));

        Self {
            objects,
            events,
            catalog_queue,
            dead_letters,
            store,
            notifier,
            pipeline,
            worker,
        }
    }

    pub async fn dead_lettered(&self) -> Vec<serde_json::Value> {
        match &self.dead_letters {
            Some(queue) => queue
                .ready_bodies()
                .await
                .iter()
                .map(|body| serde_json::from_str(body).unwrap())
                .collect(),
            None => Vec::new(),
        }
    }
}

/// S3 `ObjectCreated:Put` notification for one object.
pub fn object_created(bucket: &str, key: &str) -> String {
    json!({
        "Records": [{
            "eventVersion": "2.1",
            "eventSource": "aws:s3",
            "awsRegion": "us-east-1",
            "eventName": "ObjectCreated:Put",
            "s3": {
                "s3SchemaVersion": "1.0",
                "bucket": {"name": bucket, "arn": format!("arn:aws:s3:::{}", bucket)},
                "object": {"key": key, "size": 64, "eTag": "d41d8cd98f00b204e9800998ecf8427e"}
            }
        }]
    })
    .to_string()
}

/// Upload signer that records the keys it was asked to sign.
#[derive(Default)]
pub struct RecordingSigner {
    pub keys: Mutex<Vec<(String, Duration)>>,
}

impl RecordingSigner {
    pub fn calls(&self) -> Vec<(String, Duration)> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl UploadSigner for RecordingSigner {
    async fn presign_upload(&self, key: &str, expires_in: Duration) -> anyhow::Result<String> {
        self.keys
            .lock()
            .unwrap()
            .push((key.to_string(), expires_in));
        Ok(format!(
            "https://{}.s3.amazonaws.com/{}?X-Amz-Expires={}",
            BUCKET,
            key,
            expires_in.as_secs()
        ))
    }
}

/// Upload signer that always fails.
pub struct FailingSigner;

#[async_trait]
impl UploadSigner for FailingSigner {
    async fn presign_upload(&self, _key: &str, _expires_in: Duration) -> anyhow::Result<String> {
        anyhow::bail!("credentials expired")
    }
}
