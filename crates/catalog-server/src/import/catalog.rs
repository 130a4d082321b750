//! Catalog store
//!
//! Products live in PostgreSQL as a JSONB attribute document keyed by the
//! generated item id. Stock counts are kept in a separate table and merged on
//! read.

use async_trait::async_trait;
use catalog_common::{CatalogError, CatalogItem, RawRecord, Result};
use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};
use sqlx::{types::Json, PgPool};
use tracing::instrument;
use uuid::Uuid;

/// A catalog item together with its stock count.
///
/// Serialized flat. The stock count replaces any uploaded `count` column.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub item: CatalogItem,
    pub count: i64,
}

impl ProductView {
    pub fn new(mut item: CatalogItem, count: i64) -> Self {
        item.attributes.remove("count");
        Self { item, count }
    }
}

impl Serialize for ProductView {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("id", &self.item.id)?;
        for (field, value) in self.item.attributes.fields() {
            if field != "id" && field != "count" {
                map.serialize_entry(field, value)?;
            }
        }
        map.serialize_entry("count", &self.count)?;
        map.end()
    }
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert or replace the item stored under `item.id`.
    async fn put_item(&self, item: &CatalogItem) -> Result<()>;

    async fn get_item(&self, id: Uuid) -> Result<Option<ProductView>>;

    /// One page of products in insertion order, plus the total count.
    async fn list_items(&self, limit: i64, offset: i64) -> Result<(Vec<ProductView>, i64)>;
}

pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRecord {
    id: Uuid,
    attributes: Json<RawRecord>,
    count: i64,
}

impl From<ProductRecord> for ProductView {
    fn from(record: ProductRecord) -> Self {
        ProductView::new(CatalogItem::new(record.id, record.attributes.0), record.count)
    }
}

fn store_error(e: sqlx::Error) -> CatalogError {
    CatalogError::TransientIo(format!("catalog store: {}", e))
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    #[instrument(skip(self, item), fields(item_id = %item.id))]
    async fn put_item(&self, item: &CatalogItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, attributes)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE
            SET attributes = EXCLUDED.attributes, updated_at = NOW()
            "#,
        )
        .bind(item.id)
        .bind(Json(&item.attributes))
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn get_item(&self, id: Uuid) -> Result<Option<ProductView>> {
        let record = sqlx::query_as::<_, ProductRecord>(
            r#"
            SELECT p.id, p.attributes, COALESCE(s.count, 0)::BIGINT AS count
            FROM products p
            LEFT JOIN stocks s ON s.product_id = p.id
            WHERE p.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(record.map(ProductView::from))
    }

    async fn list_items(&self, limit: i64, offset: i64) -> Result<(Vec<ProductView>, i64)> {
        let records = sqlx::query_as::<_, ProductRecord>(
            r#"
            SELECT p.id, p.attributes, COALESCE(s.count, 0)::BIGINT AS count
            FROM products p
            LEFT JOIN stocks s ON s.product_id = p.id
            ORDER BY p.created_at, p.id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?;

        Ok((records.into_iter().map(ProductView::from).collect(), total))
    }
}
