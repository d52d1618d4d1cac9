//! SQLite-backed implementation of both ledgers.
//!
//! A single connection serves both tables, shared behind a mutex. Each
//! ledger call is one bounded round trip holding the lock for the duration
//! of that statement only. The unique indexes on the `events` identity
//! triple and the `failures` checksum enforce the dedup invariants at the
//! storage layer; check-then-insert in the engine is advisory only.
//!
//! SQLite treats NULLs as distinct in unique indexes, which is exactly the
//! sentinel semantics for absent fingerprints: payload-less rows never
//! collide with each other.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde_json::Value;
use snafu::prelude::*;

use crate::action::Ack;
use crate::error::{
    ConsumeError, DatabaseSnafu, DeserializeSnafu, LedgerError, OpenSnafu, SerializeSnafu,
};
use crate::fingerprint::Fingerprint;
use crate::handler::Handler;
use crate::metadata::Metadata;

use super::event::{ConsumedEvent, EventLedger};
use super::failure::{FailureLedger, FailureRecord};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS events (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    topic         TEXT NOT NULL,
    group_id      TEXT NOT NULL,
    checksum      TEXT,
    entity_id     TEXT,
    event_time    TEXT,
    event_type    TEXT,
    event_version TEXT,
    created_at    TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_events_identity
    ON events (topic, group_id, checksum);
CREATE INDEX IF NOT EXISTS idx_events_entity_id ON events (entity_id);

CREATE TABLE IF NOT EXISTS failures (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    topic           TEXT NOT NULL,
    group_id        TEXT NOT NULL,
    checksum        TEXT,
    entity_id       TEXT,
    event_time      TEXT,
    event_type      TEXT,
    event_version   TEXT,
    payload         TEXT,
    metadata        TEXT NOT NULL,
    error_class     TEXT,
    error_message   TEXT,
    error_backtrace TEXT,
    created_at      TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_failures_checksum ON failures (checksum);
";

/// Both ledgers backed by one SQLite database.
#[derive(Clone)]
pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedger {
    /// Open (creating if needed) the checkpoint database at `path`.
    pub fn open(path: &str) -> Result<Self, LedgerError> {
        let conn = Connection::open(path).context(OpenSnafu { path })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory().context(OpenSnafu { path: ":memory:" })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute_batch(SCHEMA).context(DatabaseSnafu)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn.lock().map_err(|_| LedgerError::ConnectionLock)
    }

    fn select_failure(
        &self,
        sql: &str,
        query_params: impl rusqlite::Params,
    ) -> Result<Option<FailureRecord>, LedgerError> {
        let row = {
            let conn = self.lock()?;
            conn.query_row(sql, query_params, read_failure_row)
                .optional()
                .context(DatabaseSnafu)?
        };
        row.map(hydrate_failure).transpose()
    }
}

const FAILURE_COLUMNS: &str = "SELECT id, topic, group_id, checksum, entity_id, event_time,
        event_type, event_version, payload, metadata, error_class,
        error_message, error_backtrace, created_at
 FROM failures";

/// Raw failure row as stored, before JSON and timestamp decoding.
type RawFailureRow = (
    i64,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
);

fn read_failure_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawFailureRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
        row.get(13)?,
    ))
}

fn hydrate_failure(raw: RawFailureRow) -> Result<FailureRecord, LedgerError> {
    let (
        id,
        topic,
        group_id,
        checksum,
        entity_id,
        event_time,
        event_type,
        event_version,
        payload_json,
        metadata_json,
        error_class,
        error_message,
        backtrace_json,
        created_at,
    ) = raw;

    let payload = payload_json
        .as_deref()
        .map(|json| serde_json::from_str(json).context(DeserializeSnafu))
        .transpose()?;
    let metadata: Metadata = serde_json::from_str(&metadata_json).context(DeserializeSnafu)?;
    let error_backtrace = backtrace_json
        .as_deref()
        .map(|json| serde_json::from_str(json).context(DeserializeSnafu))
        .transpose()?;

    Ok(FailureRecord {
        id,
        topic,
        group_id,
        checksum,
        entity_id,
        event_time: parse_optional_timestamp(event_time)?,
        event_type,
        event_version,
        payload,
        metadata,
        error_class,
        error_message,
        error_backtrace,
        created_at: parse_timestamp(&created_at)?,
    })
}

/// Map a uniqueness violation to [`LedgerError::Conflict`].
fn insert_error(error: rusqlite::Error) -> LedgerError {
    match error {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            LedgerError::Conflict
        }
        other => LedgerError::Database { source: other },
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| LedgerError::Timestamp {
            value: value.to_string(),
        })
}

fn parse_optional_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>, LedgerError> {
    value.as_deref().map(parse_timestamp).transpose()
}

impl EventLedger for SqliteLedger {
    fn exists(
        &self,
        topic: &str,
        group_id: &str,
        fingerprint: &Fingerprint,
    ) -> Result<bool, LedgerError> {
        let Some(checksum) = fingerprint.digest() else {
            return Ok(false);
        };
        let conn = self.lock()?;
        let found: bool = conn
            .query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM events
                    WHERE topic = ?1 AND group_id = ?2 AND checksum = ?3
                )",
                params![topic, group_id, checksum],
                |row| row.get(0),
            )
            .context(DatabaseSnafu)?;
        Ok(found)
    }

    fn record_ack(
        &self,
        topic: &str,
        group_id: &str,
        fingerprint: &Fingerprint,
        ack: &Ack,
    ) -> Result<ConsumedEvent, LedgerError> {
        let created_at = Utc::now();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO events
                (topic, group_id, checksum, entity_id, event_time,
                 event_type, event_version, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                topic,
                group_id,
                fingerprint.digest(),
                ack.entity_id,
                ack.event_time.to_rfc3339(),
                ack.event_type,
                ack.event_version,
                created_at.to_rfc3339(),
            ],
        )
        .map_err(insert_error)?;

        Ok(ConsumedEvent {
            id: conn.last_insert_rowid(),
            topic: topic.to_string(),
            group_id: group_id.to_string(),
            checksum: fingerprint.digest().map(str::to_owned),
            entity_id: Some(ack.entity_id.clone()),
            event_time: Some(ack.event_time),
            event_type: ack.event_type.clone(),
            event_version: ack.event_version.clone(),
            created_at,
        })
    }
}

impl FailureLedger for SqliteLedger {
    fn exists(&self, fingerprint: &Fingerprint) -> Result<bool, LedgerError> {
        let Some(checksum) = fingerprint.digest() else {
            return Ok(false);
        };
        let conn = self.lock()?;
        let found: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM failures WHERE checksum = ?1)",
                params![checksum],
                |row| row.get(0),
            )
            .context(DatabaseSnafu)?;
        Ok(found)
    }

    fn record(
        &self,
        payload: Option<&Value>,
        metadata: &Metadata,
        error: Option<&ConsumeError>,
        handler: &dyn Handler,
    ) -> Result<Option<FailureRecord>, LedgerError> {
        let fingerprint = Fingerprint::from_stored(metadata.checksum.clone());
        if FailureLedger::exists(self, &fingerprint)? {
            return Ok(None);
        }

        // Best-effort enrichment from the handler's extraction methods.
        let entity_id = payload.and_then(|p| handler.entity_id(p));
        let event_time = payload.and_then(|p| handler.event_time(p));
        let event_type = payload.and_then(|p| handler.event_type(p));
        let event_version = payload.and_then(|p| handler.event_version(p));

        let payload_json = payload
            .map(|p| serde_json::to_string(p).context(SerializeSnafu))
            .transpose()?;
        let metadata_json = serde_json::to_string(metadata).context(SerializeSnafu)?;
        let backtrace = error.and_then(|e| e.backtrace.clone());
        let backtrace_json = backtrace
            .as_ref()
            .map(|frames| serde_json::to_string(frames).context(SerializeSnafu))
            .transpose()?;
        let created_at = Utc::now();

        let insert = {
            let conn = self.lock()?;
            let result = conn.execute(
                "INSERT INTO failures
                    (topic, group_id, checksum, entity_id, event_time, event_type,
                     event_version, payload, metadata, error_class, error_message,
                     error_backtrace, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    metadata.topic,
                    metadata.group_id,
                    fingerprint.digest(),
                    entity_id,
                    event_time.map(|t| t.to_rfc3339()),
                    event_type,
                    event_version,
                    payload_json,
                    metadata_json,
                    error.map(|e| e.class.clone()),
                    error.map(|e| e.message.clone()),
                    backtrace_json,
                    created_at.to_rfc3339(),
                ],
            );
            result.map(|_| conn.last_insert_rowid())
        };

        match insert {
            Ok(id) => Ok(Some(FailureRecord {
                id,
                topic: metadata.topic.clone(),
                group_id: metadata.group_id.clone(),
                checksum: fingerprint.digest().map(str::to_owned),
                entity_id,
                event_time,
                event_type,
                event_version,
                payload: payload.cloned(),
                metadata: metadata.clone(),
                error_class: error.map(|e| e.class.clone()),
                error_message: error.map(|e| e.message.clone()),
                error_backtrace: backtrace,
                created_at,
            })),
            Err(e) => match insert_error(e) {
                // Concurrent insert won the race: already recorded.
                LedgerError::Conflict => Ok(None),
                other => Err(other),
            },
        }
    }

    fn find(&self, fingerprint: &Fingerprint) -> Result<Option<FailureRecord>, LedgerError> {
        let Some(checksum) = fingerprint.digest() else {
            return Ok(None);
        };
        self.select_failure(
            &format!("{FAILURE_COLUMNS} WHERE checksum = ?1"),
            params![checksum],
        )
    }

    fn find_by_id(&self, id: i64) -> Result<Option<FailureRecord>, LedgerError> {
        self.select_failure(&format!("{FAILURE_COLUMNS} WHERE id = ?1"), params![id])
    }

    fn delete(&self, fingerprint: &Fingerprint) -> Result<(), LedgerError> {
        let Some(checksum) = fingerprint.digest() else {
            return Ok(());
        };
        let conn = self.lock()?;
        conn.execute("DELETE FROM failures WHERE checksum = ?1", params![checksum])
            .context(DatabaseSnafu)?;
        Ok(())
    }

    fn delete_by_id(&self, id: i64) -> Result<(), LedgerError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM failures WHERE id = ?1", params![id])
            .context(DatabaseSnafu)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::EventAction;
    use async_trait::async_trait;
    use serde_json::json;

    struct PlainHandler;

    #[async_trait]
    impl Handler for PlainHandler {
        async fn consume(
            &self,
            _payload: Option<&Value>,
            _metadata: &Metadata,
        ) -> Result<EventAction, ConsumeError> {
            Ok(EventAction::Skip)
        }
    }

    struct EnrichingHandler;

    #[async_trait]
    impl Handler for EnrichingHandler {
        async fn consume(
            &self,
            _payload: Option<&Value>,
            _metadata: &Metadata,
        ) -> Result<EventAction, ConsumeError> {
            Ok(EventAction::Skip)
        }

        fn entity_id(&self, payload: &Value) -> Option<String> {
            payload["id"].as_str().map(str::to_owned)
        }

        fn event_type(&self, _payload: &Value) -> Option<String> {
            Some("order.created".to_string())
        }
    }

    fn metadata_with_checksum(payload: &Value) -> (Metadata, Fingerprint) {
        let fingerprint = Fingerprint::of(Some(payload));
        let mut metadata = Metadata::new("orders", "billing");
        metadata.checksum = fingerprint.digest().map(str::to_owned);
        (metadata, fingerprint)
    }

    #[test]
    fn test_event_exists_after_record_ack() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        let payload = json!({"data": "A"});
        let fingerprint = Fingerprint::of(Some(&payload));

        assert!(!EventLedger::exists(&ledger, "orders", "billing", &fingerprint).unwrap());

        let ack = Ack::new("A1", Utc::now()).with_event_type("order.created");
        let event = ledger
            .record_ack("orders", "billing", &fingerprint, &ack)
            .unwrap();

        assert!(event.acknowledged());
        assert_eq!(event.entity_id.as_deref(), Some("A1"));
        assert_eq!(event.checksum.as_deref(), fingerprint.digest());
        assert!(EventLedger::exists(&ledger, "orders", "billing", &fingerprint).unwrap());
    }

    #[test]
    fn test_record_ack_conflicts_on_duplicate_identity() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        let fingerprint = Fingerprint::of(Some(&json!({"data": "A"})));
        let ack = Ack::new("A1", Utc::now());

        ledger
            .record_ack("orders", "billing", &fingerprint, &ack)
            .unwrap();
        let err = ledger
            .record_ack("orders", "billing", &fingerprint, &ack)
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_same_fingerprint_different_group_is_not_a_conflict() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        let fingerprint = Fingerprint::of(Some(&json!({"data": "A"})));
        let ack = Ack::new("A1", Utc::now());

        ledger
            .record_ack("orders", "billing", &fingerprint, &ack)
            .unwrap();
        ledger
            .record_ack("orders", "shipping", &fingerprint, &ack)
            .unwrap();
    }

    #[test]
    fn test_absent_fingerprints_never_exist_and_never_collide() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        let ack = Ack::new("A1", Utc::now());

        assert!(!EventLedger::exists(&ledger, "orders", "billing", &Fingerprint::Absent).unwrap());

        // NULL checksums are distinct under the unique index.
        ledger
            .record_ack("orders", "billing", &Fingerprint::Absent, &ack)
            .unwrap();
        ledger
            .record_ack("orders", "billing", &Fingerprint::Absent, &ack)
            .unwrap();
        assert!(!EventLedger::exists(&ledger, "orders", "billing", &Fingerprint::Absent).unwrap());
    }

    #[test]
    fn test_failure_recorded_at_most_once_per_fingerprint() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        let payload = json!({"data": "A"});
        let (metadata, fingerprint) = metadata_with_checksum(&payload);
        let error = ConsumeError::new("DBTimeout", "timed out");

        let first = ledger
            .record(Some(&payload), &metadata, Some(&error), &PlainHandler)
            .unwrap();
        assert!(first.is_some());

        // Second record under a different retry count is still a no-op.
        let retried = metadata.clone().with_retry_count(4);
        let second = ledger
            .record(Some(&payload), &retried, Some(&error), &PlainHandler)
            .unwrap();
        assert!(second.is_none());
        assert!(FailureLedger::exists(&ledger, &fingerprint).unwrap());
    }

    #[test]
    fn test_failure_enrichment_is_best_effort() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        let payload = json!({"id": "A1"});
        let (metadata, fingerprint) = metadata_with_checksum(&payload);

        let record = ledger
            .record(Some(&payload), &metadata, None, &EnrichingHandler)
            .unwrap()
            .unwrap();

        assert_eq!(record.entity_id.as_deref(), Some("A1"));
        assert_eq!(record.event_type.as_deref(), Some("order.created"));
        // Methods the handler does not implement leave the field empty.
        assert!(record.event_time.is_none());
        assert!(record.event_version.is_none());
        // Non-error failures carry no classification.
        assert!(record.error_class.is_none());

        let found = ledger.find(&fingerprint).unwrap().unwrap();
        assert_eq!(found.entity_id, record.entity_id);
    }

    #[test]
    fn test_find_round_trips_payload_metadata_and_error() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        let payload = json!({"data": "A", "nested": {"n": 1}});
        let (metadata, fingerprint) = metadata_with_checksum(&payload);
        let metadata = metadata.with_retry_count(3).with_extra("partition", json!(7));
        let error = ConsumeError::new("DBTimeout", "timed out")
            .with_backtrace(vec!["consumer.rs:42".to_string()]);

        ledger
            .record(Some(&payload), &metadata, Some(&error), &PlainHandler)
            .unwrap();

        let found = ledger.find(&fingerprint).unwrap().unwrap();
        assert_eq!(found.payload.as_ref(), Some(&payload));
        assert_eq!(found.metadata, metadata);
        assert_eq!(found.error_class.as_deref(), Some("DBTimeout"));
        assert_eq!(found.error_message.as_deref(), Some("timed out"));
        assert_eq!(
            found.error_backtrace,
            Some(vec!["consumer.rs:42".to_string()])
        );
        assert_eq!(found.fingerprint(), fingerprint);
    }

    #[test]
    fn test_payload_less_failure_is_reachable_and_deletable_by_id() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        let metadata = Metadata::new("orders", "billing");
        let error = ConsumeError::new("DBTimeout", "timed out");

        let record = ledger
            .record(None, &metadata, Some(&error), &PlainHandler)
            .unwrap()
            .unwrap();
        assert!(record.checksum.is_none());

        // The absent fingerprint cannot address the row, but the id can.
        assert!(ledger.find(&Fingerprint::Absent).unwrap().is_none());
        let found = ledger.find_by_id(record.id).unwrap().unwrap();
        assert_eq!(found.error_class.as_deref(), Some("DBTimeout"));
        assert!(found.payload.is_none());

        ledger.delete(&Fingerprint::Absent).unwrap();
        assert!(ledger.find_by_id(record.id).unwrap().is_some());

        ledger.delete_by_id(record.id).unwrap();
        assert!(ledger.find_by_id(record.id).unwrap().is_none());
    }

    #[test]
    fn test_delete_removes_failure() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        let payload = json!({"data": "A"});
        let (metadata, fingerprint) = metadata_with_checksum(&payload);

        ledger
            .record(Some(&payload), &metadata, None, &PlainHandler)
            .unwrap();
        assert!(FailureLedger::exists(&ledger, &fingerprint).unwrap());

        ledger.delete(&fingerprint).unwrap();
        assert!(!FailureLedger::exists(&ledger, &fingerprint).unwrap());
        assert!(ledger.find(&fingerprint).unwrap().is_none());
    }
}
