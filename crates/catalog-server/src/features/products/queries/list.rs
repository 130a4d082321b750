use crate::import::{CatalogStore, ProductView};
use catalog_common::CatalogError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListProductsQuery {
    /// Page number (1-indexed). Defaults to 1.
    pub page: Option<i64>,
    /// Items per page. Defaults to 20, at most 100.
    pub per_page: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListProductsResponse {
    pub items: Vec<ProductView>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum ListProductsError {
    #[error("Page must be greater than 0")]
    InvalidPage,
    #[error("Per page must be between 1 and 100")]
    InvalidPerPage,
    #[error("Page is out of range")]
    PageOutOfRange,
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

impl ListProductsQuery {
    pub fn validate(&self) -> Result<(), ListProductsError> {
        if self.page.is_some_and(|page| page < 1) {
            return Err(ListProductsError::InvalidPage);
        }
        if self
            .per_page
            .is_some_and(|per_page| !(1..=MAX_PER_PAGE).contains(&per_page))
        {
            return Err(ListProductsError::InvalidPerPage);
        }
        if self.offset().is_none() {
            return Err(ListProductsError::PageOutOfRange);
        }
        Ok(())
    }

    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE)
    }

    /// Rows to skip; `None` when the page lies beyond the addressable range.
    pub fn offset(&self) -> Option<i64> {
        (self.page() - 1).checked_mul(self.per_page())
    }
}

#[tracing::instrument(skip(store))]
pub async fn handle(
    store: &dyn CatalogStore,
    query: ListProductsQuery,
) -> Result<ListProductsResponse, ListProductsError> {
    query.validate()?;

    let offset = query.offset().ok_or(ListProductsError::PageOutOfRange)?;
    let (items, total) = store.list_items(query.per_page(), offset).await?;

    Ok(ListProductsResponse {
        items,
        page: query.page(),
        per_page: query.per_page(),
        total,
    })
}
