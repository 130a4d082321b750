//! Object-store event notifications
//!
//! The upload events queue receives S3 event notification documents, either
//! directly or wrapped in an SNS envelope when the bucket publishes to a topic.
//! Bucket test notifications (`s3:TestEvent`) carry no records and decode to
//! an empty list.

use catalog_common::{CatalogError, Result};
use serde::Deserialize;

/// One object event extracted from a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEvent {
    pub event_name: String,
    pub bucket: String,
    /// Decoded object key
    pub key: String,
    /// Version id, or the ETag on unversioned buckets
    pub version: Option<String>,
}

impl ObjectEvent {
    pub fn is_object_created(&self) -> bool {
        self.event_name.starts_with("ObjectCreated:")
    }
}

#[derive(Debug, Deserialize)]
struct Notification {
    #[serde(rename = "Records", default)]
    records: Vec<EventRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventRecord {
    event_name: String,
    s3: S3Entity,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    bucket: S3Bucket,
    object: S3Object,
}

#[derive(Debug, Deserialize)]
struct S3Bucket {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S3Object {
    key: String,
    #[serde(default)]
    version_id: Option<String>,
    #[serde(default)]
    e_tag: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SnsEnvelope {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(rename = "Message")]
    message: String,
}

/// Decode an events queue message body into object events.
pub fn parse_notification(body: &str) -> Result<Vec<ObjectEvent>> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| CatalogError::RecordDecode(format!("invalid event notification: {}", e)))?;

    let document = match serde_json::from_value::<SnsEnvelope>(value.clone()) {
        Ok(envelope) if envelope.kind == "Notification" => {
            serde_json::from_str(&envelope.message).map_err(|e| {
                CatalogError::RecordDecode(format!("invalid SNS wrapped notification: {}", e))
            })?
        },
        _ => value,
    };

    let notification: Notification = serde_json::from_value(document)
        .map_err(|e| CatalogError::RecordDecode(format!("invalid event notification: {}", e)))?;

    notification
        .records
        .into_iter()
        .map(|record| {
            let version = record
                .s3
                .object
                .version_id
                .filter(|v| !v.is_empty() && v != "null")
                .or(record.s3.object.e_tag);
            Ok(ObjectEvent {
                event_name: record.event_name,
                bucket: record.s3.bucket.name,
                key: decode_object_key(&record.s3.object.key)?,
                version,
            })
        })
        .collect()
}

/// Keys in event notifications are form-encoded: `+` is a space.
pub fn decode_object_key(raw: &str) -> Result<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|key| key.into_owned())
        .map_err(|e| CatalogError::RecordDecode(format!("undecodable object key '{}': {}", raw, e)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn notification(event_name: &str, key: &str) -> serde_json::Value {
        json!({
            "Records": [{
                "eventVersion": "2.1",
                "eventSource": "aws:s3",
                "eventName": event_name,
                "s3": {
                    "bucket": {"name": "imports"},
                    "object": {"key": key, "size": 42, "eTag": "abc123", "sequencer": "00"}
                }
            }]
        })
    }

    #[test]
    fn test_parse_direct_notification() {
        let body = notification("ObjectCreated:Put", "uploaded/my+products%281%29.csv").to_string();
        let events = parse_notification(&body).unwrap_or_default();

        assert_eq!(
            events,
            vec![ObjectEvent {
                event_name: "ObjectCreated:Put".into(),
                bucket: "imports".into(),
                key: "uploaded/my products(1).csv".into(),
                version: Some("abc123".into()),
            }]
        );
        assert!(events[0].is_object_created());
    }

    #[test]
    fn test_parse_sns_wrapped_notification() {
        let inner = notification("ObjectCreated:CompleteMultipartUpload", "uploaded/a.csv");
        let body = json!({
            "Type": "Notification",
            "MessageId": "1",
            "TopicArn": "arn:aws:sns:us-east-1:000000000000:uploads",
            "Message": inner.to_string()
        })
        .to_string();

        let events = parse_notification(&body).unwrap_or_default();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key, "uploaded/a.csv");
    }

    #[test]
    fn test_version_id_preferred_over_etag() {
        let mut value = notification("ObjectCreated:Put", "uploaded/a.csv");
        value["Records"][0]["s3"]["object"]["versionId"] = json!("v2");
        let events = parse_notification(&value.to_string()).unwrap_or_default();
        assert_eq!(events[0].version.as_deref(), Some("v2"));
    }

    #[test]
    fn test_test_event_has_no_records() {
        let body = json!({
            "Service": "Amazon S3",
            "Event": "s3:TestEvent",
            "Bucket": "imports"
        })
        .to_string();
        assert!(parse_notification(&body).map(|e| e.is_empty()).unwrap_or(false));
    }

    #[test]
    fn test_removal_event_is_not_created() {
        let body = notification("ObjectRemoved:Delete", "uploaded/a.csv").to_string();
        let events = parse_notification(&body).unwrap_or_default();
        assert!(!events[0].is_object_created());
    }

    #[test]
    fn test_garbage_is_decode_error() {
        assert!(matches!(
            parse_notification("not json"),
            Err(CatalogError::RecordDecode(_))
        ));
    }
}
