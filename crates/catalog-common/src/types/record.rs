use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::Result;

/// One decoded row: column name to cell value, all strings.
///
/// Keys are kept sorted so the serialized form is canonical and can be hashed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(BTreeMap<String, String>);

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pair header names with cell values.
    ///
    /// Extra cells or headers are ignored; a repeated header keeps the last value.
    pub fn from_row<H, C>(headers: H, cells: C) -> Self
    where
        H: IntoIterator,
        H::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        headers
            .into_iter()
            .zip(cells)
            .map(|(header, cell)| (header.into(), cell.into()))
            .collect()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(field.into(), value.into())
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn remove(&mut self, field: &str) -> Option<String> {
        self.0.remove(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Canonical JSON form, identical for identical records.
    pub fn to_canonical_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    /// SHA-256 of the canonical JSON form, hex encoded.
    pub fn content_digest(&self) -> Result<String> {
        let canonical = self.to_canonical_json()?;
        Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
    }
}

impl FromIterator<(String, String)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<BTreeMap<String, String>> for RawRecord {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_row_pairs_headers_with_cells() {
        let record = RawRecord::from_row(["sku", "name"], ["A1", "Widget"]);
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("sku"), Some("A1"));
        assert_eq!(record.get("name"), Some("Widget"));
    }

    #[test]
    fn test_from_row_repeated_header_keeps_last() {
        let record = RawRecord::from_row(["tag", "tag"], ["first", "second"]);
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("tag"), Some("second"));
    }

    #[test]
    fn test_canonical_json_ignores_insertion_order() {
        let mut a = RawRecord::new();
        a.insert("name", "Widget");
        a.insert("sku", "A1");
        let b = RawRecord::from_row(["sku", "name"], ["A1", "Widget"]);

        assert_eq!(a.to_canonical_json().unwrap(), r#"{"name":"Widget","sku":"A1"}"#);
        assert_eq!(a.content_digest().unwrap(), b.content_digest().unwrap());
    }
}
