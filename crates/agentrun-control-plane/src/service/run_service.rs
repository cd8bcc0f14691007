//! Run submission, lookup, cancellation and human input.

use std::sync::Arc;

use agentrun_broker::{BrokerError, TaskStreamService};
use agentrun_core::{
    HumanInput, NewTaskRun, RunId, RunStatus, StreamId, TaskEvent, TaskRun, TaskRunUpdate, UserId,
};
use agentrun_store::{StoreError, TaskRunRepository};
use agentrun_worker::CancellationRegistry;
use thiserror::Error;
use tracing::{info, warn};

/// Errors returned to API callers.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Task run not found: {0}")]
    NotFound(RunId),

    /// The request is valid but the run is in the wrong state for it.
    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Producer-side operations on task runs.
pub struct RunService {
    broker: Arc<dyn TaskStreamService>,
    runs: Arc<dyn TaskRunRepository>,
    cancellations: Arc<CancellationRegistry>,
}

impl RunService {
    pub fn new(
        broker: Arc<dyn TaskStreamService>,
        runs: Arc<dyn TaskRunRepository>,
        cancellations: Arc<CancellationRegistry>,
    ) -> Self {
        Self {
            broker,
            runs,
            cancellations,
        }
    }

    /// Create a run and put it on the work queue.
    ///
    /// The record is moved to `queued` before the entry is appended, so a
    /// worker never claims a run that is still `pending`. If the append
    /// fails the run is marked failed.
    pub async fn submit(&self, input: NewTaskRun) -> Result<TaskRun, ServiceError> {
        let run = self.runs.create(TaskRun::new(input)).await?;
        let run = self
            .runs
            .update(&run.id, TaskRunUpdate::status(RunStatus::Queued))
            .await?;

        match self.broker.enqueue_task(&run).await {
            Ok(entry_id) => {
                info!(run_id = %run.id, task_id = %run.task_id, entry_id = %entry_id, "Task run queued");
                Ok(run)
            }
            Err(e) => {
                warn!(run_id = %run.id, error = %e, "Failed to enqueue task run");
                let update =
                    TaskRunUpdate::status(RunStatus::Failed).with_error(format!("Failed to enqueue: {e}"));
                if let Err(store_err) = self.runs.update(&run.id, update).await {
                    warn!(run_id = %run.id, error = %store_err, "Failed to mark run as failed");
                }
                Err(e.into())
            }
        }
    }

    /// A run owned by `user_id`. Other users' runs are reported as missing.
    pub async fn get(&self, run_id: &RunId, user_id: &UserId) -> Result<TaskRun, ServiceError> {
        match self.runs.find_by_id(run_id).await? {
            Some(run) if &run.user_id == user_id => Ok(run),
            _ => Err(ServiceError::NotFound(run_id.clone())),
        }
    }

    /// Cancel a run.
    ///
    /// A run nobody has claimed yet is cancelled on the spot and announced on
    /// its event stream; the worker that later claims it skips it. A running
    /// run is signalled and stops at its next iteration boundary.
    pub async fn cancel(&self, run_id: &RunId, user_id: &UserId) -> Result<TaskRun, ServiceError> {
        let run = self.get(run_id, user_id).await?;

        match run.status {
            RunStatus::Pending | RunStatus::Queued => {
                let update =
                    TaskRunUpdate::status(RunStatus::Cancelled).with_error("Task cancelled");
                let unclaimed = [RunStatus::Pending, RunStatus::Queued];
                let Some(run) = self.runs.update_if(run_id, &unclaimed, update).await? else {
                    // Claimed by a worker since the read.
                    let current = self.get(run_id, user_id).await?;
                    return self.signal(current).await;
                };
                self.broker
                    .publish_event(run_id, &TaskEvent::failed(run_id.clone(), "Task cancelled"))
                    .await?;
                info!(run_id = %run_id, "Task run cancelled before execution");
                Ok(run)
            }
            _ => self.signal(run).await,
        }
    }

    /// Trigger the cancellation token of a run being executed.
    async fn signal(&self, run: TaskRun) -> Result<TaskRun, ServiceError> {
        if run.is_terminal() {
            return Err(ServiceError::Conflict(format!(
                "Task run {} already {}",
                run.id, run.status
            )));
        }
        if !self.cancellations.cancel(&run.id).await {
            return Err(ServiceError::Conflict(format!(
                "Task run {} is not executing on this node",
                run.id
            )));
        }
        Ok(run)
    }

    /// Deliver a human decision to a run paused on one.
    pub async fn submit_input(
        &self,
        run_id: &RunId,
        user_id: &UserId,
        input: HumanInput,
    ) -> Result<StreamId, ServiceError> {
        let run = self.get(run_id, user_id).await?;
        if run.status != RunStatus::WaitingInput {
            return Err(ServiceError::Conflict(format!(
                "Task run {run_id} is not waiting for input (status: {})",
                run.status
            )));
        }

        match self.broker.publish_input(run_id, &input).await {
            Ok(id) => {
                info!(run_id = %run_id, approved = input.approved, "Human input submitted");
                Ok(id)
            }
            Err(BrokerError::InputAlreadyPending(_)) => Err(ServiceError::Conflict(format!(
                "Task run {run_id} already has a pending decision"
            ))),
            Err(e) => Err(e.into()),
        }
    }
}
