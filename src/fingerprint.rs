//! Payload fingerprinting for dedup.
//!
//! A fingerprint is a deterministic digest of the serialized payload and is
//! the dedup key for both ledgers. Messages with byte-identical payloads
//! produce the same fingerprint regardless of arrival time, partition, or
//! retry count.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Stable identity of a message payload.
///
/// `Absent` is the sentinel for missing payloads: it never matches a stored
/// digest, so tombstone-style deliveries with no body are never considered
/// duplicates of each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    /// No payload, no fingerprint.
    Absent,
    /// Lowercase hex SHA-256 of the serialized payload.
    Digest(String),
}

impl Fingerprint {
    /// Compute the fingerprint of a payload.
    ///
    /// Pure and total: recomputing on identical payloads is idempotent, and
    /// a missing payload yields [`Fingerprint::Absent`].
    pub fn of(payload: Option<&Value>) -> Self {
        match payload {
            None => Fingerprint::Absent,
            Some(value) => {
                let serialized = value.to_string();
                let digest = Sha256::digest(serialized.as_bytes());
                Fingerprint::Digest(format!("{digest:x}"))
            }
        }
    }

    /// Rebuild a fingerprint from a stored checksum column.
    pub fn from_stored(checksum: Option<String>) -> Self {
        match checksum {
            None => Fingerprint::Absent,
            Some(digest) => Fingerprint::Digest(digest),
        }
    }

    /// The hex digest, or `None` for the absent sentinel.
    pub fn digest(&self) -> Option<&str> {
        match self {
            Fingerprint::Absent => None,
            Fingerprint::Digest(digest) => Some(digest),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Fingerprint::Absent)
    }
}
