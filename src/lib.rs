//! permafrost: database-backed checkpointing for message consumers.
//!
//! This library wraps a message-consumer callback in an at-least-once
//! delivery pipeline with a checkpoint/dedup/retry state machine: a
//! logically-identical message is never processed twice, failed attempts
//! are retried through transport redelivery until a configured budget runs
//! out, and exhausted failures are durably recorded for later replay.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use permafrost::{CheckpointEngine, Config, SqliteLedger};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("config.yaml")?;
//!     let ledger = Arc::new(SqliteLedger::open(&config.database.path)?);
//!     let engine = CheckpointEngine::new(ledger.clone(), ledger, config.checkpoint);
//!
//!     // Per delivered message, from the consumer framework:
//!     let outcome = engine.around_consume(&handler, Some(&payload), &metadata).await?;
//!     Ok(())
//! }
//! ```

pub mod action;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod fingerprint;
pub mod handler;
pub mod ledger;
pub mod metadata;
pub mod registry;
pub mod replay;

// Re-export main types
pub use action::{Ack, EventAction};
pub use config::{CheckpointConfig, Config};
pub use engine::{CheckpointEngine, Outcome};
pub use error::{ConsumeError, EngineError, LedgerError, RegistryError, ReplayError};
pub use fingerprint::Fingerprint;
pub use handler::Handler;
pub use ledger::{ConsumedEvent, EventLedger, FailureLedger, FailureRecord, SqliteLedger};
pub use metadata::Metadata;
pub use registry::HandlerRegistry;
pub use replay::RetryFailure;
