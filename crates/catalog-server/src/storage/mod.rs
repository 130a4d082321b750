//! S3-compatible object storage
//!
//! The catalog never receives file bytes over its own API: clients upload
//! straight to the bucket with a presigned `PUT` URL ([`UploadSigner`]) and the
//! file parser later streams the object back ([`ObjectSource`]).

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    operation::get_object::GetObjectError,
    presigning::PresigningConfig,
    Client,
};
use catalog_common::CatalogError;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::{debug, info, instrument};

pub mod config;

/// Streaming reader over an object's bytes.
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// Issues time-bounded write handles for objects.
#[async_trait]
pub trait UploadSigner: Send + Sync {
    async fn presign_upload(&self, key: &str, expires_in: Duration) -> Result<String>;
}

/// Opens objects for streaming reads.
#[async_trait]
pub trait ObjectSource: Send + Sync {
    async fn open(&self, bucket: &str, key: &str) -> catalog_common::Result<ObjectReader>;
}

#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
}

impl Storage {
    pub async fn new(config: config::StorageConfig) -> Result<Self> {
        debug!("Initializing storage with config: {:?}", config);

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "catalog-storage",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!(bucket = %config.bucket, "Storage client initialized");

        Ok(Self {
            client,
            bucket: config.bucket,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Presigned `PUT` URL for `key` in the configured bucket.
    ///
    /// Signing happens locally; no request reaches the object store.
    #[instrument(skip(self))]
    pub async fn presigned_put_url(&self, key: &str, expires_in: Duration) -> Result<String> {
        let presigning_config = PresigningConfig::expires_in(expires_in)
            .context("Failed to create presigning config")?;

        let presigned_request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .context("Failed to generate presigned upload URL")?;

        debug!(bucket = %self.bucket, key, "Generated presigned upload URL");

        Ok(presigned_request.uri().to_string())
    }

    /// Stream an object chunk by chunk without buffering it whole.
    #[instrument(skip(self))]
    pub async fn open_stream(&self, bucket: &str, key: &str) -> catalog_common::Result<ObjectReader> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                GetObjectError::NoSuchKey(_) => {
                    CatalogError::InvalidRequest(format!("object s3://{}/{} does not exist", bucket, key))
                },
                other => CatalogError::TransientIo(format!(
                    "failed to open s3://{}/{}: {}",
                    bucket, key, other
                )),
            })?;

        debug!(
            bucket,
            key,
            content_length = response.content_length().unwrap_or(-1),
            "Opened object stream"
        );

        let chunks = futures::stream::unfold(response.body, |mut body| async move {
            body.next()
                .await
                .map(|chunk| (chunk.map_err(std::io::Error::other), body))
        });

        Ok(Box::new(StreamReader::new(Box::pin(chunks))))
    }
}

#[async_trait]
impl UploadSigner for Storage {
    async fn presign_upload(&self, key: &str, expires_in: Duration) -> Result<String> {
        self.presigned_put_url(key, expires_in).await
    }
}

#[async_trait]
impl ObjectSource for Storage {
    async fn open(&self, bucket: &str, key: &str) -> catalog_common::Result<ObjectReader> {
        self.open_stream(bucket, key).await
    }
}
