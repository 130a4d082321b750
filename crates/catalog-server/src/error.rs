//! Server-specific error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use catalog_common::CatalogError;
use thiserror::Error;

use crate::api::response::ErrorResponse;

/// Errors surfaced by HTTP handlers
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::Catalog(CatalogError::InvalidRequest(_)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST")
            },
            AppError::Internal(_) | AppError::Catalog(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Server-side details stay in the logs.
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            match self {
                AppError::NotFound(message)
                | AppError::BadRequest(message)
                | AppError::Catalog(CatalogError::InvalidRequest(message)) => message,
                other => other.to_string(),
            }
        };

        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}
