//! Shared domain types
//!
//! The contract between the file parser and the batch processor lives here:
//! a [`RawRecord`] is one decoded CSV row, a [`QueueMessage`] is its wire form on
//! the work queue, and a [`CatalogItem`] is what the batch processor persists.

mod catalog;
mod message;
mod record;

pub use catalog::{BatchSummary, CatalogItem, IdStrategy, ITEM_ID_NAMESPACE};
pub use message::{
    QueueMessage, SourceRow, ATTR_IDEMPOTENCY_KEY, ATTR_SOURCE_OBJECT, ATTR_SOURCE_ROW,
};
pub use record::RawRecord;
