//! Task run persistence.

use std::collections::HashMap;

use agentrun_core::{CoreError, RunId, RunStatus, TaskRun, TaskRunUpdate};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::StoreError;

/// Storage contract for task runs. Runs are never deleted.
#[async_trait]
pub trait TaskRunRepository: Send + Sync {
    async fn create(&self, run: TaskRun) -> Result<TaskRun, StoreError>;

    async fn find_by_id(&self, id: &RunId) -> Result<Option<TaskRun>, StoreError>;

    /// Apply a partial update and return the stored run.
    ///
    /// Fails with [`CoreError::InvalidStateTransition`] when the status
    /// machine rejects the move, leaving the record unchanged.
    async fn update(&self, id: &RunId, update: TaskRunUpdate) -> Result<TaskRun, StoreError>;

    /// Apply `update` only if the run is still in one of `expected`.
    ///
    /// The check and the write are atomic. Returns `None`, leaving the
    /// record unchanged, when the status has moved on.
    async fn update_if(
        &self,
        id: &RunId,
        expected: &[RunStatus],
        update: TaskRunUpdate,
    ) -> Result<Option<TaskRun>, StoreError>;

    /// Number of runs per status, in lifecycle order.
    async fn count_by_status(&self) -> Result<Vec<(RunStatus, usize)>, StoreError>;
}

/// [`TaskRunRepository`] kept in process memory.
#[derive(Default)]
pub struct InMemoryTaskRunRepository {
    runs: RwLock<HashMap<RunId, TaskRun>>,
}

impl InMemoryTaskRunRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRunRepository for InMemoryTaskRunRepository {
    async fn create(&self, run: TaskRun) -> Result<TaskRun, StoreError> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(&run.id) {
            return Err(CoreError::InvalidInput(format!("Task run {} already exists", run.id)).into());
        }
        runs.insert(run.id.clone(), run.clone());
        Ok(run)
    }

    async fn find_by_id(&self, id: &RunId) -> Result<Option<TaskRun>, StoreError> {
        Ok(self.runs.read().await.get(id).cloned())
    }

    async fn update(&self, id: &RunId, update: TaskRunUpdate) -> Result<TaskRun, StoreError> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(id)
            .ok_or_else(|| CoreError::RunNotFound(id.to_string()))?;
        let from = run.status;
        run.apply(update)?;
        if from != run.status {
            debug!(run_id = %id, from = %from, to = %run.status, "Task run status changed");
        }
        Ok(run.clone())
    }

    async fn update_if(
        &self,
        id: &RunId,
        expected: &[RunStatus],
        update: TaskRunUpdate,
    ) -> Result<Option<TaskRun>, StoreError> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(id)
            .ok_or_else(|| CoreError::RunNotFound(id.to_string()))?;
        if !expected.contains(&run.status) {
            debug!(run_id = %id, status = %run.status, "Conditional update skipped");
            return Ok(None);
        }
        run.apply(update)?;
        Ok(Some(run.clone()))
    }

    async fn count_by_status(&self) -> Result<Vec<(RunStatus, usize)>, StoreError> {
        let runs = self.runs.read().await;
        Ok(RunStatus::ALL
            .iter()
            .map(|status| (*status, runs.values().filter(|r| r.status == *status).count()))
            .collect())
    }
}
