//! Import pipeline configuration
//!
//! All queue URLs, the topic ARN and the tuning knobs of the pipeline are read
//! from `IMPORT_*` environment variables.

use catalog_common::IdStrategy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::env_or;

pub const DEFAULT_INBOX_PREFIX: &str = "uploaded";

/// Lifetime of a presigned upload URL.
pub const DEFAULT_UPLOAD_TTL_SECS: u64 = 60;

/// Messages handed to one batch processor invocation.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// SQS accepts at most 10 entries per batch call.
pub const MAX_QUEUE_BATCH: usize = 10;

pub const DEFAULT_MAX_IN_FLIGHT_SENDS: usize = 4;

pub const DEFAULT_MAX_RECEIVE_COUNT: u32 = 5;

/// SQS long polling tops out at 20 seconds.
pub const DEFAULT_WAIT_TIME_SECS: i32 = 20;

pub const DEFAULT_VISIBILITY_TIMEOUT_SECS: i32 = 30;

pub const DEFAULT_IDLE_BACKOFF_MS: u64 = 1000;

/// Main import configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Whether the server starts the background consumers
    pub enabled: bool,
    /// Key prefix under which uploads land and which the parser watches
    pub inbox_prefix: String,
    pub upload_ttl_secs: u64,
    pub batch_size: usize,
    pub enqueue_batch_size: usize,
    pub max_in_flight_sends: usize,
    /// Deliveries after which a failing message is dead-lettered
    pub max_receive_count: u32,
    pub id_strategy: IdStrategy,
    pub catalog_queue_url: Option<String>,
    pub events_queue_url: Option<String>,
    pub dead_letter_queue_url: Option<String>,
    pub topic_arn: Option<String>,
    pub wait_time_secs: i32,
    pub visibility_timeout_secs: i32,
    pub idle_backoff_ms: u64,
    pub aws: AwsSettings,
}

/// Connection settings for the SQS and SNS clients
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AwsSettings {
    pub region: Option<String>,
    /// Custom endpoint (LocalStack, ElasticMQ)
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

impl std::fmt::Debug for AwsSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsSettings")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ImportConfig {
    /// Load import configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let id_strategy = match env_opt("IMPORT_ID_STRATEGY") {
            Some(value) => value.parse()?,
            None => IdStrategy::default(),
        };

        let config = Self {
            enabled: env_or("IMPORT_ENABLED", false),
            inbox_prefix: normalize_prefix(&env_or(
                "IMPORT_INBOX_PREFIX",
                DEFAULT_INBOX_PREFIX.to_string(),
            )),
            upload_ttl_secs: env_or("IMPORT_UPLOAD_TTL_SECS", DEFAULT_UPLOAD_TTL_SECS),
            batch_size: env_or("IMPORT_BATCH_SIZE", DEFAULT_BATCH_SIZE),
            enqueue_batch_size: env_or("IMPORT_ENQUEUE_BATCH_SIZE", MAX_QUEUE_BATCH),
            max_in_flight_sends: env_or("IMPORT_MAX_IN_FLIGHT_SENDS", DEFAULT_MAX_IN_FLIGHT_SENDS),
            max_receive_count: env_or("IMPORT_MAX_RECEIVE_COUNT", DEFAULT_MAX_RECEIVE_COUNT),
            id_strategy,
            catalog_queue_url: env_opt("IMPORT_CATALOG_QUEUE_URL"),
            events_queue_url: env_opt("IMPORT_EVENTS_QUEUE_URL"),
            dead_letter_queue_url: env_opt("IMPORT_DEAD_LETTER_QUEUE_URL"),
            topic_arn: env_opt("IMPORT_TOPIC_ARN"),
            wait_time_secs: env_or("IMPORT_WAIT_TIME_SECS", DEFAULT_WAIT_TIME_SECS),
            visibility_timeout_secs: env_or(
                "IMPORT_VISIBILITY_TIMEOUT_SECS",
                DEFAULT_VISIBILITY_TIMEOUT_SECS,
            ),
            idle_backoff_ms: env_or("IMPORT_IDLE_BACKOFF_MS", DEFAULT_IDLE_BACKOFF_MS),
            aws: AwsSettings {
                region: env_opt("IMPORT_AWS_REGION").or_else(|| env_opt("AWS_REGION")),
                endpoint: env_opt("IMPORT_AWS_ENDPOINT"),
                access_key: env_opt("IMPORT_AWS_ACCESS_KEY")
                    .or_else(|| env_opt("AWS_ACCESS_KEY_ID")),
                secret_key: env_opt("IMPORT_AWS_SECRET_KEY")
                    .or_else(|| env_opt("AWS_SECRET_ACCESS_KEY")),
            },
        };

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch_size == 0 || self.batch_size > MAX_QUEUE_BATCH {
            anyhow::bail!("IMPORT_BATCH_SIZE must be between 1 and {}", MAX_QUEUE_BATCH);
        }

        if self.enqueue_batch_size == 0 || self.enqueue_batch_size > MAX_QUEUE_BATCH {
            anyhow::bail!(
                "IMPORT_ENQUEUE_BATCH_SIZE must be between 1 and {}",
                MAX_QUEUE_BATCH
            );
        }

        if self.max_in_flight_sends == 0 {
            anyhow::bail!("IMPORT_MAX_IN_FLIGHT_SENDS must be greater than 0");
        }

        if self.max_receive_count == 0 {
            anyhow::bail!("IMPORT_MAX_RECEIVE_COUNT must be greater than 0");
        }

        if self.upload_ttl_secs == 0 {
            anyhow::bail!("IMPORT_UPLOAD_TTL_SECS must be greater than 0");
        }

        if !(0..=20).contains(&self.wait_time_secs) {
            anyhow::bail!("IMPORT_WAIT_TIME_SECS must be between 0 and 20");
        }

        if self.enabled {
            self.require_endpoints()?;
        }

        Ok(())
    }

    /// Queue URLs and topic ARN needed to run the pipeline.
    pub fn require_endpoints(&self) -> anyhow::Result<(&str, &str, &str)> {
        let catalog = self
            .catalog_queue_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("IMPORT_CATALOG_QUEUE_URL is required"))?;
        let events = self
            .events_queue_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("IMPORT_EVENTS_QUEUE_URL is required"))?;
        let topic = self
            .topic_arn
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("IMPORT_TOPIC_ARN is required"))?;
        Ok((catalog, events, topic))
    }

    pub fn upload_ttl(&self) -> Duration {
        Duration::from_secs(self.upload_ttl_secs)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            inbox_prefix: DEFAULT_INBOX_PREFIX.to_string(),
            upload_ttl_secs: DEFAULT_UPLOAD_TTL_SECS,
            batch_size: DEFAULT_BATCH_SIZE,
            enqueue_batch_size: MAX_QUEUE_BATCH,
            max_in_flight_sends: DEFAULT_MAX_IN_FLIGHT_SENDS,
            max_receive_count: DEFAULT_MAX_RECEIVE_COUNT,
            id_strategy: IdStrategy::default(),
            catalog_queue_url: None,
            events_queue_url: None,
            dead_letter_queue_url: None,
            topic_arn: None,
            wait_time_secs: DEFAULT_WAIT_TIME_SECS,
            visibility_timeout_secs: DEFAULT_VISIBILITY_TIMEOUT_SECS,
            idle_backoff_ms: DEFAULT_IDLE_BACKOFF_MS,
            aws: AwsSettings::default(),
        }
    }
}

/// Strip surrounding slashes so keys are always `<prefix>/<name>`.
pub fn normalize_prefix(prefix: &str) -> String {
    prefix.trim().trim_matches('/').to_string()
}

/// Object key for an uploaded file.
pub fn inbox_key(prefix: &str, file_name: &str) -> String {
    if prefix.is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{}", prefix, file_name)
    }
}

/// Whether `key` sits under the inbox prefix.
pub fn in_inbox(prefix: &str, key: &str) -> bool {
    prefix.is_empty()
        || key
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/') && rest.len() > 1)
}
