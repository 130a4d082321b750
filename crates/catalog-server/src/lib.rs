//! Catalog Server Library
//!
//! Product catalog backend with an asynchronous bulk-import pipeline.
//!
//! # Overview
//!
//! - **API**: upload handles (`/api/v1/import`) and catalog reads
//!   (`/api/v1/products`)
//! - **Import pipeline**: CSV objects are parsed off the request path, fanned
//!   out one row per queue message and written to the catalog in small batches
//!   (see [`import`])
//! - **Storage**: S3-compatible object store for uploads
//! - **Database**: PostgreSQL via SQLx
//!
//! # Example
//!
//! ```no_run
//! use catalog_server::{api, config::Config, features, import, storage};
//! use std::sync::Arc;
//!
//! # async fn run(pool: sqlx::PgPool) -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let storage = storage::Storage::new(storage::config::StorageConfig::from_env()?).await?;
//! let state = features::FeatureState {
//!     catalog: Arc::new(import::PgCatalogStore::new(pool)),
//!     imports: features::imports::ImportsState {
//!         signer: Arc::new(storage),
//!         settings: features::imports::UploadSettings {
//!             inbox_prefix: "uploaded".to_string(),
//!             ttl: std::time::Duration::from_secs(60),
//!         },
//!     },
//! };
//! let app = api::create_router(state, &config.cors);
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod api;
pub mod config;
pub mod error;
pub mod features;
pub mod import;
pub mod middleware;
pub mod storage;

pub use error::AppError;
