//! Catalog Common Library
//!
//! Shared contract, error handling and logging for the catalog import workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`CatalogError`] and the [`Result`] alias
//! - **Types**: raw records, queue messages, catalog items and batch summaries
//!   exchanged between the file parser and the batch processor
//! - **Logging**: tracing subscriber set-up shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use catalog_common::types::{QueueMessage, RawRecord};
//!
//! fn enqueue_row(headers: &[&str], cells: &[&str]) -> catalog_common::Result<String> {
//!     let record = RawRecord::from_row(headers.iter().copied(), cells.iter().copied());
//!     QueueMessage::new(record).encode_body()
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CatalogError, Result};
pub use types::{
    BatchSummary, CatalogItem, IdStrategy, QueueMessage, RawRecord, SourceRow, ATTR_IDEMPOTENCY_KEY,
    ATTR_SOURCE_OBJECT, ATTR_SOURCE_ROW,
};
