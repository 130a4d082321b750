use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RawRecord;
use crate::{CatalogError, Result};

/// Namespace for deterministic catalog item identifiers (UUIDv5).
pub const ITEM_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_8b0d_4c3a_9e57_d2b1_a0c4_e913);

/// How the batch processor assigns catalog item identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    /// UUIDv5 of the message's idempotency key (or its content digest).
    /// Redelivery of the same message maps to the same item.
    #[default]
    Deterministic,
    /// Fresh UUIDv4 per processing attempt. Redelivery creates a duplicate item.
    Random,
}

impl IdStrategy {
    pub fn mint(self, idempotency_key: Option<&str>, record: &RawRecord) -> Result<Uuid> {
        match self {
            IdStrategy::Random => Ok(Uuid::new_v4()),
            IdStrategy::Deterministic => {
                let name = match idempotency_key {
                    Some(key) if !key.is_empty() => key.to_string(),
                    _ => record.content_digest()?,
                };
                Ok(Uuid::new_v5(&ITEM_ID_NAMESPACE, name.as_bytes()))
            },
        }
    }
}

impl std::str::FromStr for IdStrategy {
    type Err = CatalogError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deterministic" | "idempotent" => Ok(IdStrategy::Deterministic),
            "random" => Ok(IdStrategy::Random),
            _ => Err(CatalogError::Config(format!("Invalid id strategy: {}", s))),
        }
    }
}

impl std::fmt::Display for IdStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdStrategy::Deterministic => write!(f, "deterministic"),
            IdStrategy::Random => write!(f, "random"),
        }
    }
}

/// A raw record persisted to the catalog under a generated identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: Uuid,
    #[serde(flatten)]
    pub attributes: RawRecord,
}

impl CatalogItem {
    /// The identifier is never taken from the upload: an `id` column is dropped.
    pub fn new(id: Uuid, mut attributes: RawRecord) -> Self {
        attributes.remove("id");
        Self { id, attributes }
    }
}

/// Aggregate of the items written by one batch, published once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub message: String,
    pub count: usize,
    pub products: Vec<CatalogItem>,
}

impl BatchSummary {
    pub fn new(products: Vec<CatalogItem>) -> Self {
        Self {
            message: format!("{} products created", products.len()),
            count: products.len(),
            products,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn widget() -> RawRecord {
        RawRecord::from_row(["sku", "name"], ["A1", "Widget"])
    }

    #[test]
    fn test_deterministic_ids_follow_the_key() {
        let strategy = IdStrategy::Deterministic;
        let a = strategy.mint(Some("key-1"), &widget()).unwrap();
        assert_eq!(a, strategy.mint(Some("key-1"), &widget()).unwrap());
        assert_ne!(a, strategy.mint(Some("key-2"), &widget()).unwrap());
        assert_eq!(a.get_version_num(), 5);
    }

    #[test]
    fn test_deterministic_ids_fall_back_to_content() {
        let strategy = IdStrategy::Deterministic;
        let other = RawRecord::from_row(["sku"], ["A2"]);
        assert_eq!(strategy.mint(None, &widget()).unwrap(), strategy.mint(Some(""), &widget()).unwrap());
        assert_ne!(strategy.mint(None, &widget()).unwrap(), strategy.mint(None, &other).unwrap());
    }

    #[test]
    fn test_random_ids_differ_per_attempt() {
        let strategy = IdStrategy::Random;
        let a = strategy.mint(Some("key-1"), &widget()).unwrap();
        let b = strategy.mint(Some("key-1"), &widget()).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.get_version_num(), 4);
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("random".parse::<IdStrategy>().unwrap(), IdStrategy::Random);
        assert_eq!("Deterministic".parse::<IdStrategy>().unwrap(), IdStrategy::Deterministic);
        assert!("sequential".parse::<IdStrategy>().is_err());
    }

    #[test]
    fn test_item_serializes_flat_and_ignores_uploaded_id() {
        let mut record = widget();
        record.insert("id", "from-the-file");
        let id = Uuid::new_v4();
        let item = CatalogItem::new(id, record);

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["id"], id.to_string());
        assert_eq!(json["sku"], "A1");
        assert_eq!(json.as_object().unwrap().len(), 3);
    }

    #[test]
    fn test_summary_counts_products() {
        let items = vec![
            CatalogItem::new(Uuid::new_v4(), widget()),
            CatalogItem::new(Uuid::new_v4(), RawRecord::from_row(["sku"], ["A2"])),
        ];
        let summary = BatchSummary::new(items);
        assert_eq!(summary.count, 2);
        assert_eq!(summary.message, "2 products created");
    }
}
