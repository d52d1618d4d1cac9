//! The per-message metadata bag.
//!
//! The transport supplies topic, group, and retry count; the engine merges
//! the computed checksum in before anything downstream sees the bag. Any
//! extra consumer-framework context (partition, offset, listener id, ...)
//! rides along in the flattened `extra` map and is persisted verbatim with
//! failure records.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata delivered alongside a message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub topic: String,
    pub group_id: String,
    /// Number of redelivery attempts so far. Defaults to 0.
    #[serde(default)]
    pub retry_count: u32,
    /// Payload fingerprint, merged in by the engine before dispatch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Additional consumer-framework context, kept as-is.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl Metadata {
    pub fn new(topic: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            group_id: group_id.into(),
            retry_count: 0,
            checksum: None,
            extra: HashMap::new(),
        }
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_retry_count_defaults_to_zero() {
        let metadata: Metadata =
            serde_json::from_str(r#"{"topic":"orders","group_id":"billing"}"#).unwrap();
        assert_eq!(metadata.retry_count, 0);
        assert!(metadata.checksum.is_none());
    }

    #[test]
    fn test_extra_context_is_flattened() {
        let metadata = Metadata::new("orders", "billing")
            .with_extra("partition", json!(3))
            .with_extra("offset", json!(128));

        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value["partition"], json!(3));
        assert_eq!(value["offset"], json!(128));
        assert_eq!(value["topic"], json!("orders"));

        let parsed: Metadata = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, metadata);
    }
}
