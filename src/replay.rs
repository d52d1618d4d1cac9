//! Replay of stored failures.
//!
//! A replay rebuilds the original invocation from a failure record and
//! resubmits it through the same checkpoint engine with a fresh retry
//! budget. On success the failure record is deleted; on error it is left
//! intact and the error propagates unchanged, so the caller decides what to
//! do with a second failure.

use std::sync::Arc;

use snafu::prelude::*;
use tracing::info;

use crate::engine::{CheckpointEngine, Outcome};
use crate::error::{ReplayEngineSnafu, ReplayError, ReplayLedgerSnafu, ReplayRegistrySnafu};
use crate::ledger::{FailureLedger, FailureRecord};
use crate::registry::HandlerRegistry;

/// Resubmits stored failures through the checkpoint engine.
pub struct RetryFailure {
    engine: Arc<CheckpointEngine>,
    registry: Arc<HandlerRegistry>,
    failures: Arc<dyn FailureLedger>,
}

impl RetryFailure {
    pub fn new(
        engine: Arc<CheckpointEngine>,
        registry: Arc<HandlerRegistry>,
        failures: Arc<dyn FailureLedger>,
    ) -> Self {
        Self {
            engine,
            registry,
            failures,
        }
    }

    /// Replay one stored failure.
    ///
    /// The metadata is the failure's original bag with `retry_count` reset
    /// to 0: a manual retry always gets a fresh budget. The engine
    /// recomputes the fingerprint from the stored payload, so dedup still
    /// applies if the message was consumed through another path meanwhile.
    pub async fn perform(&self, failure: &FailureRecord) -> Result<Outcome, ReplayError> {
        let handler = self
            .registry
            .lookup(&failure.group_id)
            .context(ReplayRegistrySnafu)?;

        let metadata = failure.metadata.clone().with_retry_count(0);
        let outcome = self
            .engine
            .around_consume(handler.as_ref(), failure.payload.as_ref(), &metadata)
            .await
            .context(ReplayEngineSnafu)?;

        // Keyed on the row id so payload-less failures (absent fingerprint,
        // NULL checksum) are destroyed too.
        self.failures
            .delete_by_id(failure.id)
            .context(ReplayLedgerSnafu)?;

        info!(
            topic = %failure.topic,
            group_id = %failure.group_id,
            checksum = ?failure.checksum,
            outcome = ?outcome,
            "Replayed failure"
        );
        Ok(outcome)
    }
}
