use crate::import::{CatalogStore, ProductView};
use catalog_common::CatalogError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetProductQuery {
    pub id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GetProductError {
    #[error("Product id must be a UUID")]
    InvalidId,
    #[error("Product not found")]
    NotFound,
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

impl GetProductQuery {
    pub fn validate(&self) -> Result<Uuid, GetProductError> {
        Uuid::parse_str(self.id.trim()).map_err(|_| GetProductError::InvalidId)
    }
}

#[tracing::instrument(skip(store))]
pub async fn handle(
    store: &dyn CatalogStore,
    query: GetProductQuery,
) -> Result<ProductView, GetProductError> {
    let id = query.validate()?;
    store.get_item(id).await?.ok_or(GetProductError::NotFound)
}
