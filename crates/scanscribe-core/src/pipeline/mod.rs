/// Pipeline contracts: one producer emitting records, N consumers each
/// draining their own queue, and the coordinator joining them.
///
/// Every party runs on its own thread and reports back through an events
/// trait object, never by returning values. The coordinator is the only
/// listener in production; tests plug in their own.
pub mod cancel;
pub mod coordinator;
pub mod queued;

#[cfg(test)]
pub(crate) mod testing;

pub use cancel::CancelToken;
pub use coordinator::{Coordinator, CoordinatorState};
pub use queued::QueuedConsumer;

use crate::error::ScanError;
use crate::model::Record;
use std::sync::Arc;

/// Listener for producer events.
///
/// After `completed` or `failed` nothing else is raised. A cancelled
/// producer raises neither.
pub trait ProducerEvents: Send + Sync {
    fn produced(&self, record: Record);
    fn completed(&self);
    fn failed(&self, error: ScanError);
}

/// Source of the record stream.
pub trait RecordProducer: Send + Sync {
    /// Begin producing on a worker thread. No-op if already started.
    fn start(&self, events: Arc<dyn ProducerEvents>);

    /// Request a cooperative stop. Idempotent.
    fn cancel(&self);

    /// Wait for the worker thread, if one was started.
    fn join(&self);
}

/// Listener for consumer events.
pub trait ConsumerEvents: Send + Sync {
    /// One record was fully handled by the consumer.
    fn processed(&self, record: &Record);
    fn completed(&self);
    fn failed(&self, error: ScanError);
}

/// An independent sink draining the record stream.
pub trait StreamConsumer: Send + Sync {
    /// Short name used in logs and progress reports.
    fn name(&self) -> &str;

    /// Install the events listener. Only the first call takes effect.
    fn subscribe(&self, events: Arc<dyn ConsumerEvents>);

    /// Enqueue a record. Ignored once cancelled.
    fn queue_task(&self, record: Arc<Record>);

    /// The producer has completed: drain what is queued, then complete.
    fn finish(&self);

    /// Stop as soon as possible and roll back. Idempotent.
    fn cancel(&self);

    /// Wait for the worker thread, if one was started.
    fn join(&self);
}

/// How a consumer's worker loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Cancelled,
    Failed,
}

/// The per-sink part of a queued consumer: what to do with each record and
/// how to wrap up.
///
/// Runs exclusively on the consumer's worker thread.
pub trait RecordProcessor: Send {
    fn name(&self) -> &str;

    /// Handle one record. Returning `Err(ScanError::Cancelled)` ends the
    /// loop as a cancellation rather than a failure.
    fn process_record(&mut self, record: &Arc<Record>, cancel: &CancelToken)
        -> Result<(), ScanError>;

    /// Called exactly once when the worker loop ends.
    fn finalize(&mut self, outcome: Outcome) -> Result<(), ScanError>;
}
