//! Error types for permafrost using snafu.
//!
//! This module defines structured error types with context selectors for
//! all error conditions in the codebase.

use snafu::prelude::*;

// ============ Ledger Errors ============

/// Errors that can occur during ledger operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LedgerError {
    /// A row with the same identity already exists.
    #[snafu(display("Ledger row already exists for this identity"))]
    Conflict,

    /// Failed to open the checkpoint database.
    #[snafu(display("Failed to open checkpoint database at {path}"))]
    Open {
        source: rusqlite::Error,
        path: String,
    },

    /// Database operation failed.
    #[snafu(display("Database operation failed"))]
    Database { source: rusqlite::Error },

    /// JSON serialization of a ledger column failed.
    #[snafu(display("Failed to serialize ledger record"))]
    Serialize { source: serde_json::Error },

    /// JSON deserialization of a ledger column failed.
    #[snafu(display("Failed to deserialize ledger record"))]
    Deserialize { source: serde_json::Error },

    /// A stored timestamp could not be parsed.
    #[snafu(display("Invalid timestamp in stored record: {value}"))]
    Timestamp { value: String },

    /// Connection lock failed (mutex poisoned).
    #[snafu(display("Connection lock failed: mutex poisoned"))]
    ConnectionLock,
}

impl LedgerError {
    /// Check if this error represents a uniqueness violation on write.
    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::Conflict)
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Database path is empty.
    #[snafu(display("Database path cannot be empty"))]
    EmptyDatabasePath,

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },
}

// ============ Registry Errors ============

/// Errors raised when resolving handlers from the registry.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RegistryError {
    /// No handler was registered for the consumer group.
    #[snafu(display("Handler not found for group id '{group_id}'"))]
    HandlerNotFound { group_id: String },
}

// ============ Consume Error ============

/// Classification of an error raised by a wrapped handler.
///
/// Handlers can fail with arbitrary error types; the engine only needs a
/// stable classification to persist into the failure ledger, so the class
/// name, message, and backtrace are captured eagerly.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConsumeError {
    /// Error kind or type name (e.g. "DBTimeout").
    pub class: String,
    /// Human-readable message.
    pub message: String,
    /// Structured backtrace, one frame per entry.
    pub backtrace: Option<Vec<String>>,
}

impl ConsumeError {
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
            backtrace: None,
        }
    }

    /// Capture classification from a concrete error value.
    ///
    /// The class is the error's type name with the module path stripped.
    pub fn from_error<E: std::error::Error>(error: &E) -> Self {
        let type_name = std::any::type_name::<E>();
        let class = type_name.rsplit("::").next().unwrap_or(type_name);
        Self::new(class, error.to_string())
    }

    pub fn with_backtrace(mut self, frames: Vec<String>) -> Self {
        self.backtrace = Some(frames);
        self
    }
}

impl std::fmt::Display for ConsumeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.class, self.message)
    }
}

impl std::error::Error for ConsumeError {}

// ============ Engine Errors ============

/// Errors surfaced by the checkpoint engine.
///
/// `Retriable` is the transport-redelivery signal: the handler failed and
/// the retry budget is not yet exhausted, so the caller is expected to
/// redeliver the message with an incremented retry count. `Ledger` errors
/// are never masked because doing so would silently drop dedup or
/// failure-recording guarantees.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum EngineError {
    /// Handler failed and the retry policy says retry.
    #[snafu(display("Handler failed, retry scheduled (retry_count={retry_count})"))]
    Retriable {
        source: ConsumeError,
        retry_count: u32,
    },

    /// Ledger I/O failed.
    #[snafu(display("Ledger error"))]
    Ledger { source: LedgerError },
}

impl EngineError {
    /// Check if this error asks the transport to redeliver the message.
    pub fn is_retriable(&self) -> bool {
        matches!(self, EngineError::Retriable { .. })
    }
}

// ============ Replay Errors ============

/// Errors surfaced when replaying a stored failure.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReplayError {
    /// No handler registered for the failure's group.
    #[snafu(display("Failed to resolve handler for replay"))]
    ReplayRegistry { source: RegistryError },

    /// The replayed invocation failed; the failure record is left intact.
    #[snafu(display("Replayed invocation failed"))]
    ReplayEngine { source: EngineError },

    /// Deleting the failure record after a successful replay failed.
    #[snafu(display("Failed to delete replayed failure record"))]
    ReplayLedger { source: LedgerError },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Snafu)]
    #[snafu(display("connection timed out after {seconds}s"))]
    struct DbTimeout {
        seconds: u64,
    }

    #[test]
    fn test_consume_error_from_error_strips_module_path() {
        let err = DbTimeout { seconds: 5 };
        let captured = ConsumeError::from_error(&err);
        assert_eq!(captured.class, "DbTimeout");
        assert_eq!(captured.message, "connection timed out after 5s");
        assert!(captured.backtrace.is_none());
    }

    #[test]
    fn test_ledger_error_is_conflict() {
        assert!(LedgerError::Conflict.is_conflict());
        assert!(!LedgerError::ConnectionLock.is_conflict());
    }

    #[test]
    fn test_engine_error_is_retriable() {
        let err = EngineError::Retriable {
            source: ConsumeError::new("DbTimeout", "timed out"),
            retry_count: 2,
        };
        assert!(err.is_retriable());
    }
}
