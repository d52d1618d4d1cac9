//! The checkpoint engine.
//!
//! Wraps every message-consume invocation in the dedup/retry state machine:
//! fingerprint, dedup short-circuit, handler invocation, outcome
//! interpretation, ledger write, lifecycle events. The engine exclusively
//! owns the decision of which ledger an invocation writes to.

use std::sync::Arc;

use serde_json::Value;
use snafu::prelude::*;

use crate::action::EventAction;
use crate::config::CheckpointConfig;
use crate::emit;
use crate::error::{EngineError, LedgerSnafu};
use crate::events::{
    Acknowledged, AlreadyConsumed, DedupCheckPerformed, FailureRecorded, InvocationStarted,
    NotAcknowledged, Skipped,
};
use crate::fingerprint::Fingerprint;
use crate::handler::Handler;
use crate::ledger::{EventLedger, FailureLedger};
use crate::metadata::Metadata;

/// Terminal outcome of one wrapped invocation.
///
/// The transport-redelivery path is not an outcome: it surfaces as
/// [`EngineError::Retriable`] so callers cannot confuse "retry later" with
/// "done".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Dedup short-circuit: the fingerprint was already in the event ledger
    /// (or the ack insert lost a race to a concurrent duplicate delivery).
    AlreadyConsumed,
    /// Handler acknowledged; a consumed event was recorded.
    Acked,
    /// Handler returned no action; nothing recorded.
    Skipped,
    /// Handler explicitly rejected; nothing recorded.
    NotAcknowledged,
    /// Retry budget exhausted; the failure was durably recorded and the
    /// handler error swallowed.
    FailureRecorded,
}

/// The `around_consume` state machine.
pub struct CheckpointEngine {
    events: Arc<dyn EventLedger>,
    failures: Arc<dyn FailureLedger>,
    config: CheckpointConfig,
}

impl CheckpointEngine {
    pub fn new(
        events: Arc<dyn EventLedger>,
        failures: Arc<dyn FailureLedger>,
        config: CheckpointConfig,
    ) -> Self {
        Self {
            events,
            failures,
            config,
        }
    }

    /// Retry while the budget allows. With no configured maximum the
    /// answer is always yes.
    fn should_retry(&self, metadata: &Metadata) -> bool {
        match self.config.max_retries {
            Some(max) => metadata.retry_count < max,
            None => true,
        }
    }

    /// Process one message delivery.
    ///
    /// The dedup check runs before the handler is ever invoked, layering an
    /// at-most-once processing effect on top of the at-least-once
    /// transport. On a retriable handler error the engine re-raises
    /// unchanged and makes no ledger writes; redelivery with an incremented
    /// `retry_count` is the transport's job, this engine never loops
    /// internally.
    pub async fn around_consume(
        &self,
        handler: &dyn Handler,
        payload: Option<&Value>,
        metadata: &Metadata,
    ) -> Result<Outcome, EngineError> {
        let fingerprint = Fingerprint::of(payload);
        let mut metadata = metadata.clone();
        metadata.checksum = fingerprint.digest().map(str::to_owned);

        emit!(DedupCheckPerformed {
            metadata: &metadata
        });
        let already_consumed = self
            .events
            .exists(&metadata.topic, &metadata.group_id, &fingerprint)
            .context(LedgerSnafu)?;
        if already_consumed {
            emit!(AlreadyConsumed {
                metadata: &metadata
            });
            return Ok(Outcome::AlreadyConsumed);
        }

        emit!(InvocationStarted {
            metadata: &metadata
        });
        let action = match handler.consume(payload, &metadata).await {
            Ok(action) => action,
            Err(error) => {
                if self.should_retry(&metadata) {
                    return Err(EngineError::Retriable {
                        retry_count: metadata.retry_count,
                        source: error,
                    });
                }
                // Budget exhausted: record durably, swallow the error.
                self.failures
                    .record(payload, &metadata, Some(&error), handler)
                    .context(LedgerSnafu)?;
                emit!(FailureRecorded {
                    metadata: &metadata,
                    error_class: Some(error.class.as_str()),
                });
                return Ok(Outcome::FailureRecorded);
            }
        };

        match action {
            EventAction::Ack(ack) => {
                let recorded = self.events.record_ack(
                    &metadata.topic,
                    &metadata.group_id,
                    &fingerprint,
                    &ack,
                );
                match recorded {
                    Ok(_) => {
                        emit!(Acknowledged {
                            metadata: &metadata
                        });
                        Ok(Outcome::Acked)
                    }
                    // Lost the race to a concurrent duplicate delivery.
                    Err(e) if e.is_conflict() => {
                        emit!(AlreadyConsumed {
                            metadata: &metadata
                        });
                        Ok(Outcome::AlreadyConsumed)
                    }
                    Err(e) => Err(EngineError::Ledger { source: e }),
                }
            }
            EventAction::Nack => {
                emit!(NotAcknowledged {
                    metadata: &metadata
                });
                Ok(Outcome::NotAcknowledged)
            }
            EventAction::Skip => {
                emit!(Skipped {
                    metadata: &metadata
                });
                Ok(Outcome::Skipped)
            }
        }
    }
}
