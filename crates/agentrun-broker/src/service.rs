//! The broker contract shared by producers, workers and observers.

use std::time::Duration;

use agentrun_core::{HumanInput, RunId, StreamId, StreamMessage, TaskEvent, TaskRun};
use async_trait::async_trait;
use serde::Serialize;

use crate::BrokerError;

/// Snapshot of the work queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Entries retained in the log, acknowledged ones included.
    pub length: usize,
    /// Entries claimed by a consumer but not acknowledged yet.
    pub pending: usize,
}

/// Work queue, per-run event streams and human-input channels.
///
/// Blocking reads take a `block` duration; `Duration::ZERO` means "do not
/// block". Blocking reads return an empty batch (or `None`) on timeout.
#[async_trait]
pub trait TaskStreamService: Send + Sync {
    /// Create a consumer group over the work queue, starting at its
    /// beginning. Creating an existing group is a no-op.
    async fn create_consumer_group(&self, group: &str) -> Result<(), BrokerError>;

    /// Append a run to the work queue.
    async fn enqueue_task(&self, run: &TaskRun) -> Result<StreamId, BrokerError>;

    /// Claim up to `count` entries for `consumer`, waiting up to `block` if
    /// none are available. Claimed entries stay pending until acknowledged.
    async fn consume_tasks(
        &self,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamMessage<TaskRun>>, BrokerError>;

    /// Acknowledge a claimed entry. Returns false if it was not pending.
    async fn ack_task(&self, group: &str, id: &StreamId) -> Result<bool, BrokerError>;

    /// Append an event to a run's stream.
    async fn publish_event(&self, run_id: &RunId, event: &TaskEvent)
        -> Result<StreamId, BrokerError>;

    /// Up to `count` past events, oldest first, starting at `from`
    /// (inclusive) or at the beginning of the stream.
    async fn event_history(
        &self,
        run_id: &RunId,
        from: Option<&StreamId>,
        count: usize,
    ) -> Result<Vec<StreamMessage<TaskEvent>>, BrokerError>;

    /// Events strictly after `after`, waiting up to `block` for the first one.
    async fn subscribe_events(
        &self,
        run_id: &RunId,
        after: &StreamId,
        block: Duration,
    ) -> Result<Vec<StreamMessage<TaskEvent>>, BrokerError>;

    /// Deliver a decision to a run. At most one decision may be pending.
    async fn publish_input(&self, run_id: &RunId, input: &HumanInput)
        -> Result<StreamId, BrokerError>;

    /// Take the pending decision for a run, waiting up to `timeout`.
    async fn wait_for_input(
        &self,
        run_id: &RunId,
        timeout: Duration,
    ) -> Result<Option<HumanInput>, BrokerError>;

    /// Runs that currently have an event stream.
    async fn event_streams(&self) -> Result<Vec<RunId>, BrokerError>;

    /// Drop event and input streams of runs that ended more than `retention`
    /// ago. Returns the number of runs dropped.
    async fn purge_event_streams(&self, retention: Duration) -> Result<usize, BrokerError>;

    async fn queue_stats(&self) -> Result<QueueStats, BrokerError>;

    /// Release the backend. Blocked readers return and later calls fail with
    /// [`BrokerError::Unavailable`].
    async fn close(&self);
}
