//! The failure ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConsumeError, LedgerError};
use crate::fingerprint::Fingerprint;
use crate::handler::Handler;
use crate::metadata::Metadata;

/// A message whose processing permanently failed.
///
/// Carries the original payload and metadata bag exactly as seen at failure
/// time, so the invocation can be rebuilt and replayed later. Enrichment
/// fields are filled best-effort from the handler's extraction methods;
/// error classification is absent when the failure was a non-ack outcome
/// rather than a handler error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub id: i64,
    pub topic: String,
    pub group_id: String,
    pub checksum: Option<String>,
    pub entity_id: Option<String>,
    pub event_time: Option<DateTime<Utc>>,
    pub event_type: Option<String>,
    pub event_version: Option<String>,
    pub payload: Option<Value>,
    pub metadata: Metadata,
    pub error_class: Option<String>,
    pub error_message: Option<String>,
    pub error_backtrace: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
}

impl FailureRecord {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::from_stored(self.checksum.clone())
    }
}

/// Store of permanently failed messages, unique per fingerprint.
pub trait FailureLedger: Send + Sync {
    fn exists(&self, fingerprint: &Fingerprint) -> Result<bool, LedgerError>;

    /// Record a failure, at most once per fingerprint.
    ///
    /// Returns `Ok(None)` without overwriting when a record for this
    /// fingerprint already exists, including when a concurrent insert wins
    /// the race. Enrichment is pulled from the handler's optional
    /// extraction methods; any method returning `None` leaves the field
    /// empty rather than failing the record.
    fn record(
        &self,
        payload: Option<&Value>,
        metadata: &Metadata,
        error: Option<&ConsumeError>,
        handler: &dyn Handler,
    ) -> Result<Option<FailureRecord>, LedgerError>;

    /// Look up a stored failure by fingerprint.
    fn find(&self, fingerprint: &Fingerprint) -> Result<Option<FailureRecord>, LedgerError>;

    /// Look up a stored failure by row id.
    fn find_by_id(&self, id: i64) -> Result<Option<FailureRecord>, LedgerError>;

    /// Remove a stored failure by fingerprint.
    fn delete(&self, fingerprint: &Fingerprint) -> Result<(), LedgerError>;

    /// Remove a stored failure by row id. Called when a replay completes
    /// without raising; keying on the id also destroys payload-less
    /// records, whose absent fingerprint is unreachable by checksum.
    fn delete_by_id(&self, id: i64) -> Result<(), LedgerError>;
}
