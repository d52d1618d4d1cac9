//! Event actions returned by wrapped handlers.
//!
//! The engine inspects the handler's return value structurally: only an
//! [`EventAction::Ack`] writes to the event ledger, everything else is a
//! no-op for the ledgers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Acknowledgment payload carrying the enriched identity fields that are
/// persisted onto the consumed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// External entity identifier.
    pub entity_id: String,
    /// When the event happened in the source system.
    pub event_time: DateTime<Utc>,
    /// Event type, if the source distinguishes types.
    pub event_type: Option<String>,
    /// Event schema version, if any.
    pub event_version: Option<String>,
}

impl Ack {
    pub fn new(entity_id: impl Into<String>, event_time: DateTime<Utc>) -> Self {
        Self {
            entity_id: entity_id.into(),
            event_time,
            event_type: None,
            event_version: None,
        }
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_event_version(mut self, event_version: impl Into<String>) -> Self {
        self.event_version = Some(event_version.into());
        self
    }
}

/// Outcome a handler reports for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventAction {
    /// Message processed, record it as consumed.
    Ack(Ack),
    /// Message explicitly rejected. Treated like a skip for ledger purposes
    /// but surfaced as its own lifecycle event.
    Nack,
    /// Nothing to do for this message.
    Skip,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_builder_fills_optional_fields() {
        let now = Utc::now();
        let ack = Ack::new("A1", now)
            .with_event_type("order.created")
            .with_event_version("v1");

        assert_eq!(ack.entity_id, "A1");
        assert_eq!(ack.event_time, now);
        assert_eq!(ack.event_type.as_deref(), Some("order.created"));
        assert_eq!(ack.event_version.as_deref(), Some("v1"));
    }

    #[test]
    fn test_ack_optional_fields_default_to_none() {
        let ack = Ack::new("A1", Utc::now());
        assert!(ack.event_type.is_none());
        assert!(ack.event_version.is_none());
    }
}
