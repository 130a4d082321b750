//! Import API routes
//!
//! - `GET /api/v1/import?name=<file>` - Issue a presigned upload URL
//!   (`fileName` is accepted as an alias for `name`)

use crate::api::response::ApiResponse;
use crate::error::AppError;
use crate::storage::UploadSigner;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use catalog_common::CatalogError;
use serde::Deserialize;
use std::sync::Arc;

use super::commands::{RequestUploadCommand, RequestUploadError, UploadSettings};

#[derive(Clone)]
pub struct ImportsState {
    pub signer: Arc<dyn UploadSigner>,
    pub settings: UploadSettings,
}

#[derive(Debug, Deserialize)]
struct UploadParams {
    name: Option<String>,
    #[serde(rename = "fileName")]
    file_name: Option<String>,
}

pub fn imports_routes() -> Router<ImportsState> {
    Router::new().route("/", get(request_upload))
}

/// Issue an upload handle
///
/// # Response
///
/// - `200 OK` - `{ signed_url, key, expires_in }`
/// - `400 Bad Request` - Missing, blank or invalid file name
/// - `500 Internal Server Error` - Signing failed
#[tracing::instrument(skip(state))]
async fn request_upload(
    State(state): State<ImportsState>,
    Query(params): Query<UploadParams>,
) -> Result<Response, AppError> {
    let command = RequestUploadCommand {
        file_name: params.name.or(params.file_name),
    };

    let response =
        super::commands::request_upload::handle(state.signer.as_ref(), &state.settings, command)
            .await?;

    tracing::info!(key = %response.key, expires_in = response.expires_in, "Upload handle issued");

    Ok(ApiResponse::success(response).into_response())
}

impl From<RequestUploadError> for AppError {
    fn from(err: RequestUploadError) -> Self {
        match err {
            RequestUploadError::Signing(e) => AppError::Internal(format!("{:#}", e)),
            other => AppError::Catalog(CatalogError::InvalidRequest(other.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_validation_errors_are_bad_requests() {
        let response = AppError::from(RequestUploadError::NameRequired).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_signing_errors_are_internal() {
        let err = RequestUploadError::Signing(anyhow::anyhow!("no credentials"));
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
