//! Product API routes
//!
//! - `GET /api/v1/products` - List products with their stock count
//! - `GET /api/v1/products/:id` - Get a single product by id

use crate::api::response::ApiResponse;
use crate::error::AppError;
use crate::import::CatalogStore;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use catalog_common::CatalogError;
use serde_json::json;
use std::sync::Arc;

use super::queries::{GetProductError, GetProductQuery, ListProductsError, ListProductsQuery};

pub fn products_routes() -> Router<Arc<dyn CatalogStore>> {
    Router::new()
        .route("/", get(list_products))
        .route("/:id", get(get_product))
}

#[tracing::instrument(skip(store))]
async fn list_products(
    State(store): State<Arc<dyn CatalogStore>>,
    Query(query): Query<ListProductsQuery>,
) -> Result<Response, AppError> {
    let response = super::queries::list::handle(store.as_ref(), query).await?;

    let meta = json!({
        "page": response.page,
        "per_page": response.per_page,
        "total": response.total,
    });

    Ok(ApiResponse::success_with_meta(response.items, meta).into_response())
}

#[tracing::instrument(skip(store))]
async fn get_product(
    State(store): State<Arc<dyn CatalogStore>>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let product = super::queries::get::handle(store.as_ref(), GetProductQuery { id }).await?;

    Ok(ApiResponse::success(product).into_response())
}

impl From<GetProductError> for AppError {
    fn from(err: GetProductError) -> Self {
        match err {
            GetProductError::InvalidId => AppError::BadRequest(err.to_string()),
            GetProductError::NotFound => AppError::NotFound(err.to_string()),
            GetProductError::Catalog(e) => AppError::Catalog(e),
        }
    }
}

impl From<ListProductsError> for AppError {
    fn from(err: ListProductsError) -> Self {
        match err {
            ListProductsError::Catalog(e) => AppError::Catalog(e),
            other => AppError::Catalog(CatalogError::InvalidRequest(other.to_string())),
        }
    }
}
