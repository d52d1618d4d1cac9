//! The consumed-event ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::Ack;
use crate::error::LedgerError;
use crate::fingerprint::Fingerprint;

/// A durably recorded consumed message.
///
/// At most one row exists per (topic, group_id, checksum) triple. Rows are
/// created only via a successful acknowledgment, enriched exactly once at
/// creation, and never deleted by normal flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumedEvent {
    pub id: i64,
    pub topic: String,
    pub group_id: String,
    pub checksum: Option<String>,
    pub entity_id: Option<String>,
    pub event_time: Option<DateTime<Utc>>,
    pub event_type: Option<String>,
    pub event_version: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ConsumedEvent {
    /// Whether this event carries acknowledgment enrichment.
    pub fn acknowledged(&self) -> bool {
        self.entity_id.is_some()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::from_stored(self.checksum.clone())
    }
}

/// Store of consumed events, existence-checked by fingerprint for dedup.
pub trait EventLedger: Send + Sync {
    /// Point lookup against the unique identity triple.
    ///
    /// Always `false` for an absent fingerprint: payload-less messages
    /// never dedup against each other.
    fn exists(
        &self,
        topic: &str,
        group_id: &str,
        fingerprint: &Fingerprint,
    ) -> Result<bool, LedgerError>;

    /// Insert a consumed event with enrichment copied from the ack.
    ///
    /// Fails with [`LedgerError::Conflict`] if the identity triple already
    /// exists. The unique index is the source of truth under concurrent
    /// writers; callers are expected to have checked `exists` first, but
    /// must still handle the conflict.
    fn record_ack(
        &self,
        topic: &str,
        group_id: &str,
        fingerprint: &Fingerprint,
        ack: &Ack,
    ) -> Result<ConsumedEvent, LedgerError>;
}
