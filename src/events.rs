//! Internal lifecycle events for metrics emission.
//!
//! Each event struct represents one checkpointing lifecycle notification.
//! Events implement the `InternalEvent` trait which logs the metadata bag
//! and increments the corresponding counter metric. These are
//! fire-and-forget observability hooks, never control flow.

use metrics::counter;
use tracing::{debug, trace};

use crate::metadata::Metadata;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Emitted events can be recorded with a single macro call.
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::events::InternalEvent::emit($event)
    };
}

/// Event emitted when the dedup existence check runs.
pub struct DedupCheckPerformed<'a> {
    pub metadata: &'a Metadata,
}

impl InternalEvent for DedupCheckPerformed<'_> {
    fn emit(self) {
        trace!(
            topic = %self.metadata.topic,
            group_id = %self.metadata.group_id,
            checksum = ?self.metadata.checksum,
            "Dedup check performed"
        );
        counter!("permafrost_dedup_checks_total").increment(1);
    }
}

/// Event emitted when a message is short-circuited as already consumed.
pub struct AlreadyConsumed<'a> {
    pub metadata: &'a Metadata,
}

impl InternalEvent for AlreadyConsumed<'_> {
    fn emit(self) {
        debug!(
            topic = %self.metadata.topic,
            group_id = %self.metadata.group_id,
            checksum = ?self.metadata.checksum,
            "Event already consumed"
        );
        counter!("permafrost_events_already_consumed_total").increment(1);
    }
}

/// Event emitted just before the wrapped handler is invoked.
pub struct InvocationStarted<'a> {
    pub metadata: &'a Metadata,
}

impl InternalEvent for InvocationStarted<'_> {
    fn emit(self) {
        trace!(
            topic = %self.metadata.topic,
            group_id = %self.metadata.group_id,
            checksum = ?self.metadata.checksum,
            retry_count = self.metadata.retry_count,
            "Handler invocation started"
        );
        counter!("permafrost_invocations_total").increment(1);
    }
}

/// Event emitted when an acknowledged message is recorded.
pub struct Acknowledged<'a> {
    pub metadata: &'a Metadata,
}

impl InternalEvent for Acknowledged<'_> {
    fn emit(self) {
        debug!(
            topic = %self.metadata.topic,
            group_id = %self.metadata.group_id,
            checksum = ?self.metadata.checksum,
            "Event acknowledged"
        );
        counter!("permafrost_events_acknowledged_total").increment(1);
    }
}

/// Event emitted when a handler returns no action for a message.
pub struct Skipped<'a> {
    pub metadata: &'a Metadata,
}

impl InternalEvent for Skipped<'_> {
    fn emit(self) {
        debug!(
            topic = %self.metadata.topic,
            group_id = %self.metadata.group_id,
            checksum = ?self.metadata.checksum,
            "Event skipped"
        );
        counter!("permafrost_events_skipped_total").increment(1);
    }
}

/// Event emitted when a handler explicitly rejects a message.
pub struct NotAcknowledged<'a> {
    pub metadata: &'a Metadata,
}

impl InternalEvent for NotAcknowledged<'_> {
    fn emit(self) {
        debug!(
            topic = %self.metadata.topic,
            group_id = %self.metadata.group_id,
            checksum = ?self.metadata.checksum,
            "Event not acknowledged"
        );
        counter!("permafrost_events_nacked_total").increment(1);
    }
}

/// Event emitted when a failure is durably recorded.
pub struct FailureRecorded<'a> {
    pub metadata: &'a Metadata,
    pub error_class: Option<&'a str>,
}

impl InternalEvent for FailureRecorded<'_> {
    fn emit(self) {
        debug!(
            topic = %self.metadata.topic,
            group_id = %self.metadata.group_id,
            checksum = ?self.metadata.checksum,
            retry_count = self.metadata.retry_count,
            error_class = ?self.error_class,
            "Failure recorded"
        );
        counter!("permafrost_failures_recorded_total").increment(1);
    }
}
