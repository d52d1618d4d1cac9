//! Durable ledgers backing the checkpoint engine.
//!
//! Two stores: the event ledger (every acknowledged message, dedup-checked
//! by fingerprint) and the failure ledger (messages whose retry budget ran
//! out, kept until a replay succeeds). Both are narrow traits over plain
//! data structs; the SQLite implementation enforces the uniqueness
//! invariants with unique indexes, which is the sole concurrency-correctness
//! mechanism for dedup under concurrent duplicate deliveries.

pub mod event;
pub mod failure;
pub mod sqlite;

pub use event::{ConsumedEvent, EventLedger};
pub use failure::{FailureLedger, FailureRecord};
pub use sqlite::SqliteLedger;
