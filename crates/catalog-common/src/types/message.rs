use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use super::RawRecord;
use crate::{CatalogError, Result};

/// Message attribute carrying the stable per-row idempotency key.
pub const ATTR_IDEMPOTENCY_KEY: &str = "idempotency-key";
/// Message attribute carrying `s3://bucket/key` of the source file.
pub const ATTR_SOURCE_OBJECT: &str = "source-object";
/// Message attribute carrying the 1-based data row number in the source file.
pub const ATTR_SOURCE_ROW: &str = "source-row";

/// Where a record came from: one data row of one object version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRow {
    pub bucket: String,
    pub key: String,
    /// Object version id, or the ETag when the bucket is unversioned.
    pub version: Option<String>,
    pub row: u64,
}

impl SourceRow {
    pub fn object_uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }

    /// Stable across re-parses of the same object version.
    pub fn idempotency_key(&self) -> String {
        let input = format!(
            "{}/{}@{}#{}",
            self.bucket,
            self.key,
            self.version.as_deref().unwrap_or(""),
            self.row
        );
        hex::encode(Sha256::digest(input.as_bytes()))
    }
}

/// One raw record on its way through the work queue.
///
/// The body is the record as a flat JSON object. Provenance never enters the
/// body; it travels as message attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub record: RawRecord,
    pub source: Option<SourceRow>,
}

impl QueueMessage {
    pub fn new(record: RawRecord) -> Self {
        Self {
            record,
            source: None,
        }
    }

    pub fn with_source(mut self, source: SourceRow) -> Self {
        self.source = Some(source);
        self
    }

    pub fn encode_body(&self) -> Result<String> {
        self.record.to_canonical_json()
    }

    pub fn attributes(&self) -> BTreeMap<String, String> {
        let mut attributes = BTreeMap::new();
        if let Some(source) = &self.source {
            attributes.insert(ATTR_IDEMPOTENCY_KEY.to_string(), source.idempotency_key());
            attributes.insert(ATTR_SOURCE_OBJECT.to_string(), source.object_uri());
            attributes.insert(ATTR_SOURCE_ROW.to_string(), source.row.to_string());
        }
        attributes
    }

    /// Decode a message body back into a raw record.
    ///
    /// Scalar values are accepted and rendered as strings (`null` becomes an
    /// empty string); nested arrays and objects are rejected.
    pub fn decode_body(body: &str) -> Result<RawRecord> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| CatalogError::RecordDecode(format!("invalid JSON body: {}", e)))?;

        let Value::Object(fields) = value else {
            return Err(CatalogError::RecordDecode(
                "message body is not a JSON object".to_string(),
            ));
        };

        fields
            .into_iter()
            .map(|(field, value)| {
                let cell = match value {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    Value::Bool(b) => b.to_string(),
                    Value::Number(n) => n.to_string(),
                    Value::Array(_) | Value::Object(_) => {
                        return Err(CatalogError::RecordDecode(format!(
                            "field '{}' is not a scalar value",
                            field
                        )))
                    },
                };
                Ok((field, cell))
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn source(row: u64) -> SourceRow {
        SourceRow {
            bucket: "imports".to_string(),
            key: "uploaded/products.csv".to_string(),
            version: Some("v1".to_string()),
            row,
        }
    }

    #[test]
    fn test_body_is_flat_record_json() {
        let message = QueueMessage::new(RawRecord::from_row(["sku", "name"], ["A1", "Widget"]))
            .with_source(source(1));

        let body = message.encode_body().unwrap();
        assert_eq!(body, r#"{"name":"Widget","sku":"A1"}"#);
        assert_eq!(QueueMessage::decode_body(&body).unwrap(), message.record);
    }

    #[test]
    fn test_attributes_carry_provenance() {
        let attributes = QueueMessage::new(RawRecord::new()).with_source(source(7)).attributes();
        assert_eq!(attributes[ATTR_SOURCE_OBJECT], "s3://imports/uploaded/products.csv");
        assert_eq!(attributes[ATTR_SOURCE_ROW], "7");
        assert_eq!(attributes[ATTR_IDEMPOTENCY_KEY].len(), 64);

        assert!(QueueMessage::new(RawRecord::new()).attributes().is_empty());
    }

    #[test]
    fn test_idempotency_key_depends_on_row_and_version() {
        assert_eq!(source(3).idempotency_key(), source(3).idempotency_key());
        assert_ne!(source(3).idempotency_key(), source(4).idempotency_key());

        let mut other_version = source(3);
        other_version.version = Some("v2".to_string());
        assert_ne!(source(3).idempotency_key(), other_version.idempotency_key());
    }

    #[test]
    fn test_decode_body_stringifies_scalars() {
        let record = QueueMessage::decode_body(r#"{"price": 9.5, "active": true, "note": null}"#).unwrap();
        assert_eq!(record.get("price"), Some("9.5"));
        assert_eq!(record.get("active"), Some("true"));
        assert_eq!(record.get("note"), Some(""));
    }

    #[test]
    fn test_decode_body_rejects_bad_input() {
        for body in ["{not json", "[1,2]", r#"{"tags": ["a"]}"#, "\"text\""] {
            let err = QueueMessage::decode_body(body).unwrap_err();
            assert!(matches!(err, CatalogError::RecordDecode(_)), "body {body} gave {err:?}");
        }
    }
}
