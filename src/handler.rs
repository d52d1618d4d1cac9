//! The handler trait wrapped by the checkpoint engine.
//!
//! This abstraction is the seam between the engine and the consumer
//! framework: the framework registers one handler per consumer group and
//! the engine invokes it once per non-duplicate message.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::action::EventAction;
use crate::error::ConsumeError;
use crate::metadata::Metadata;

/// A message-processing callback with optional enrichment capabilities.
///
/// The four extraction methods are called only when a failure is recorded,
/// to fill the failure record's enrichment fields on a best-effort basis.
/// The defaults return `None`; handlers override whichever ones they can
/// answer for their payloads.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Process one message.
    ///
    /// The metadata bag includes the payload checksum computed by the
    /// engine. Errors are classified and either re-raised for transport
    /// redelivery or persisted to the failure ledger, depending on the
    /// retry policy.
    async fn consume(
        &self,
        payload: Option<&Value>,
        metadata: &Metadata,
    ) -> Result<EventAction, ConsumeError>;

    /// External entity identifier for this payload, if derivable.
    fn entity_id(&self, _payload: &Value) -> Option<String> {
        None
    }

    /// Source-system event time for this payload, if derivable.
    fn event_time(&self, _payload: &Value) -> Option<DateTime<Utc>> {
        None
    }

    /// Event type for this payload, if derivable.
    fn event_type(&self, _payload: &Value) -> Option<String> {
        None
    }

    /// Event schema version for this payload, if derivable.
    fn event_version(&self, _payload: &Value) -> Option<String> {
        None
    }
}

impl std::fmt::Debug for dyn Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Handler")
    }
}
