//! Feature modules implementing the catalog API
//!
//! Each feature is a vertical slice with its own commands or queries and
//! routes:
//!
//! - **imports**: presigned upload handles for bulk CSV imports
//! - **products**: catalog reads merged with stock counts
//!
//! Handlers validate input in the command/query type, call its `handle`
//! function and map the feature error into [`crate::error::AppError`].

pub mod imports;
pub mod products;

use crate::import::CatalogStore;
use axum::Router;
use std::sync::Arc;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    pub catalog: Arc<dyn CatalogStore>,
    pub imports: imports::ImportsState,
}

/// Creates the API router with all feature routes mounted
///
/// - `/import` - Upload handles
/// - `/products` - Catalog reads
pub fn router(state: FeatureState) -> Router<()> {
    Router::new()
        .nest("/import", imports::imports_routes().with_state(state.imports))
        .nest("/products", products::products_routes().with_state(state.catalog))
}
