//! HTTP API integration tests
//!
//! Drives the full router (middleware included) with in-memory collaborators.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use catalog_common::{CatalogItem, RawRecord};
use catalog_server::{
    api::create_router,
    config::CorsConfig,
    features::{
        imports::{ImportsState, UploadSettings},
        FeatureState,
    },
    import::{memory::MemoryCatalog, CatalogStore},
    storage::UploadSigner,
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;
use uuid::Uuid;

mod common;
use common::{FailingSigner, RecordingSigner};

fn cors() -> CorsConfig {
    CorsConfig {
        allowed_origins: vec!["*".to_string()],
        allow_credentials: false,
    }
}

fn app(catalog: Arc<MemoryCatalog>, signer: Arc<dyn UploadSigner>) -> Router {
    let state = FeatureState {
        catalog: catalog as Arc<dyn CatalogStore>,
        imports: ImportsState {
            signer,
            settings: UploadSettings {
                inbox_prefix: "uploaded".to_string(),
                ttl: Duration::from_secs(60),
            },
        },
    };
    create_router(state, &cors())
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn seed(catalog: &MemoryCatalog, sku: &str) -> Uuid {
    let id = Uuid::new_v4();
    let item = CatalogItem::new(id, RawRecord::from_row(["sku", "name"], [sku, "Widget"]));
    catalog.put_item(&item).await.unwrap();
    id
}

// ============================================================================
// Upload handles
// ============================================================================

#[tokio::test]
async fn test_upload_handle_is_issued() {
    let signer = Arc::new(RecordingSigner::default());
    let app = app(Arc::new(MemoryCatalog::new()), signer.clone());

    let (status, json) = get(app, "/api/v1/import?name=products.csv").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["key"], "uploaded/products.csv");
    assert_eq!(json["data"]["expires_in"], 60);
    assert!(json["data"]["signed_url"]
        .as_str()
        .unwrap()
        .contains("uploaded/products.csv"));

    assert_eq!(
        signer.calls(),
        vec![("uploaded/products.csv".to_string(), Duration::from_secs(60))]
    );
}

#[tokio::test]
async fn test_upload_handle_accepts_file_name_alias() {
    let signer = Arc::new(RecordingSigner::default());
    let app = app(Arc::new(MemoryCatalog::new()), signer.clone());

    let (status, json) = get(app, "/api/v1/import?fileName=stock%20list.csv").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["key"], "uploaded/stock list.csv");
}

#[tokio::test]
async fn test_upload_handle_requires_name() {
    for uri in ["/api/v1/import", "/api/v1/import?name=", "/api/v1/import?name=%20%20"] {
        let signer = Arc::new(RecordingSigner::default());
        let app = app(Arc::new(MemoryCatalog::new()), signer.clone());

        let (status, json) = get(app, uri).await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "uri {}", uri);
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
        assert!(signer.calls().is_empty());
    }
}

#[tokio::test]
async fn test_upload_handle_rejects_unsafe_names() {
    let long = "a".repeat(256);
    for name in ["../etc/passwd", "nested/products.csv", long.as_str()] {
        let signer = Arc::new(RecordingSigner::default());
        let app = app(Arc::new(MemoryCatalog::new()), signer.clone());

        let uri = format!("/api/v1/import?name={}", urlencoding::encode(name));
        let (status, json) = get(app, &uri).await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "name {}", name);
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
        assert!(signer.calls().is_empty());
    }
}

#[tokio::test]
async fn test_signing_failure_is_internal_error() {
    let app = app(Arc::new(MemoryCatalog::new()), Arc::new(FailingSigner));

    let (status, json) = get(app, "/api/v1/import?name=products.csv").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"]["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"]["message"], "Internal server error");
}

// ============================================================================
// Products
// ============================================================================

#[tokio::test]
async fn test_list_products_merges_stock() {
    let catalog = Arc::new(MemoryCatalog::new());
    let stocked = seed(&catalog, "A1").await;
    seed(&catalog, "A2").await;
    catalog.set_stock(stocked, 7).await;

    let (status, json) = get(
        app(catalog, Arc::new(RecordingSigner::default())),
        "/api/v1/products",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let items = json["data"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["id"], stocked.to_string());
    assert_eq!(items[0]["sku"], "A1");
    assert_eq!(items[0]["count"], 7);
    assert_eq!(items[1]["count"], 0);
    assert_eq!(json["meta"]["total"], 2);
    assert_eq!(json["meta"]["page"], 1);
    assert_eq!(json["meta"]["per_page"], 20);
}

#[tokio::test]
async fn test_list_products_paginates() {
    let catalog = Arc::new(MemoryCatalog::new());
    for i in 0..5 {
        seed(&catalog, &format!("A{}", i)).await;
    }

    let (status, json) = get(
        app(catalog, Arc::new(RecordingSigner::default())),
        "/api/v1/products?page=2&per_page=2",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let skus: Vec<_> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["sku"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(skus, vec!["A2", "A3"]);
    assert_eq!(json["meta"]["total"], 5);
}

#[tokio::test]
async fn test_list_products_rejects_bad_paging() {
    for uri in ["/api/v1/products?page=0", "/api/v1/products?per_page=101"] {
        let (status, json) = get(
            app(Arc::new(MemoryCatalog::new()), Arc::new(RecordingSigner::default())),
            uri,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "uri {}", uri);
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
    }
}

#[tokio::test]
async fn test_list_products_rejects_page_beyond_range() {
    let uri = format!("/api/v1/products?page={}&per_page=100", i64::MAX);
    let (status, json) = get(
        app(Arc::new(MemoryCatalog::new()), Arc::new(RecordingSigner::default())),
        &uri,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_stock_count_overrides_uploaded_count_column() {
    let catalog = Arc::new(MemoryCatalog::new());
    let id = Uuid::new_v4();
    let item = CatalogItem::new(id, RawRecord::from_row(["sku", "count"], ["A1", "7"]));
    catalog.put_item(&item).await.unwrap();
    catalog.set_stock(id, 2).await;

    let response = app(catalog, Arc::new(RecordingSigner::default()))
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/products/{}", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = String::from_utf8(bytes.to_vec()).unwrap();
    assert_eq!(body.matches("\"count\"").count(), 1);

    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["data"]["count"], 2);
    assert_eq!(json["data"]["sku"], "A1");
}

#[tokio::test]
async fn test_get_product() {
    let catalog = Arc::new(MemoryCatalog::new());
    let id = seed(&catalog, "A1").await;
    catalog.set_stock(id, 3).await;

    let (status, json) = get(
        app(catalog, Arc::new(RecordingSigner::default())),
        &format!("/api/v1/products/{}", id),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["id"], id.to_string());
    assert_eq!(json["data"]["name"], "Widget");
    assert_eq!(json["data"]["count"], 3);
}

#[tokio::test]
async fn test_get_product_errors() {
    let catalog = Arc::new(MemoryCatalog::new());

    let (status, json) = get(
        app(catalog.clone(), Arc::new(RecordingSigner::default())),
        "/api/v1/products/not-a-uuid",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "BAD_REQUEST");

    let (status, json) = get(
        app(catalog, Arc::new(RecordingSigner::default())),
        &format!("/api/v1/products/{}", Uuid::new_v4()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "NOT_FOUND");
}

// ============================================================================
// Service
// ============================================================================

#[tokio::test]
async fn test_health() {
    let (status, json) = get(
        app(Arc::new(MemoryCatalog::new()), Arc::new(RecordingSigner::default())),
        "/health",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn test_cors_preflight_allows_get() {
    let app = app(Arc::new(MemoryCatalog::new()), Arc::new(RecordingSigner::default()));

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/v1/import")
                .header(header::ORIGIN, "https://shop.example.com")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_success());
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );
}
