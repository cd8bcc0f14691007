//! TaskRun - the unit of work handed to workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{AgentId, CoreError, RunId, RunStatus, TaskId, UserId};

/// One execution of a task by an agent.
///
/// Created by the producer at submission time and mutated only by the worker
/// that claimed it from the work queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRun {
    pub id: RunId,
    pub task_id: TaskId,
    pub user_id: UserId,
    pub agent_id: AgentId,

    /// User prompt that starts the conversation.
    pub prompt: String,

    /// Overrides the worker's default system prompt when set.
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Free-form variables supplied with the submission.
    #[serde(default)]
    pub variables: Option<Map<String, Value>>,

    pub status: RunStatus,

    /// 0-100.
    #[serde(default)]
    pub progress: u8,

    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub tokens_input: u64,
    #[serde(default)]
    pub tokens_output: u64,

    /// Run directory on the worker that executed it.
    #[serde(default)]
    pub local_path: Option<String>,
    /// Object-storage prefix once the run directory has been synced.
    #[serde(default)]
    pub storage_prefix: Option<String>,

    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
}

impl TaskRun {
    /// Create a new pending run from a submission.
    pub fn new(input: NewTaskRun) -> Self {
        Self {
            id: RunId::generate(),
            task_id: input.task_id,
            user_id: input.user_id,
            agent_id: input.agent_id,
            prompt: input.prompt,
            system_prompt: input.system_prompt,
            variables: input.variables,
            status: RunStatus::Pending,
            progress: 0,
            result: None,
            error: None,
            tokens_input: 0,
            tokens_output: 0,
            local_path: None,
            storage_prefix: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            synced_at: None,
        }
    }

    /// Check if the run is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a partial update, enforcing the status machine and the
    /// result/error and token invariants.
    ///
    /// On error the run is left untouched.
    pub fn apply(&mut self, update: TaskRunUpdate) -> Result<(), CoreError> {
        if update.result.is_some() && update.error.is_some() {
            return Err(CoreError::InvalidInput(
                "result and error are mutually exclusive".to_string(),
            ));
        }

        if let Some(next) = update.status {
            if self.status.is_terminal() || (next != self.status && !self.status.can_transition_to(next)) {
                return Err(CoreError::InvalidStateTransition {
                    from: self.status,
                    to: next,
                });
            }
        }

        if update.tokens_input.is_some_and(|t| t < self.tokens_input)
            || update.tokens_output.is_some_and(|t| t < self.tokens_output)
        {
            return Err(CoreError::InvalidInput(
                "token counters cannot decrease".to_string(),
            ));
        }

        let now = Utc::now();
        if let Some(next) = update.status {
            if next == RunStatus::Running && self.started_at.is_none() {
                self.started_at = Some(now);
            }
            if next.is_terminal() && update.completed_at.is_none() {
                self.completed_at = Some(now);
            }
            self.status = next;
        }
        if let Some(progress) = update.progress {
            self.progress = progress.min(100);
        }
        if let Some(result) = update.result {
            self.result = Some(result);
            self.error = None;
        }
        if let Some(error) = update.error {
            self.error = Some(error);
            self.result = None;
        }
        if let Some(tokens) = update.tokens_input {
            self.tokens_input = tokens;
        }
        if let Some(tokens) = update.tokens_output {
            self.tokens_output = tokens;
        }
        if let Some(path) = update.local_path {
            self.local_path = Some(path);
        }
        if let Some(prefix) = update.storage_prefix {
            self.storage_prefix = Some(prefix);
        }
        if let Some(at) = update.started_at {
            self.started_at = Some(at);
        }
        if let Some(at) = update.completed_at {
            self.completed_at = Some(at);
        }
        if let Some(at) = update.synced_at {
            self.synced_at = Some(at);
        }
        Ok(())
    }
}

/// Submission input for a new run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTaskRun {
    pub task_id: TaskId,
    pub user_id: UserId,
    pub agent_id: AgentId,
    pub prompt: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub variables: Option<Map<String, Value>>,
}

/// Partial update of a run. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskRunUpdate {
    pub status: Option<RunStatus>,
    pub progress: Option<u8>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub tokens_input: Option<u64>,
    pub tokens_output: Option<u64>,
    pub local_path: Option<String>,
    pub storage_prefix: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub synced_at: Option<DateTime<Utc>>,
}

impl TaskRunUpdate {
    /// Update that only moves the status.
    pub fn status(status: RunStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Builder method to set progress.
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Builder method to set the final result.
    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    /// Builder method to set the error.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Builder method to set cumulative token counts.
    pub fn with_tokens(mut self, input: u64, output: u64) -> Self {
        self.tokens_input = Some(input);
        self.tokens_output = Some(output);
        self
    }

    /// Builder method to record the worker-local run directory.
    pub fn with_local_path(mut self, path: impl Into<String>) -> Self {
        self.local_path = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run() -> TaskRun {
        TaskRun::new(NewTaskRun {
            task_id: TaskId::new("task-1"),
            user_id: UserId::new("user-1"),
            agent_id: AgentId::new("agent-1"),
            prompt: "list files".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_new_run_is_pending() {
        let run = run();
        assert_eq!(run.status, RunStatus::Pending);
        assert_eq!(run.progress, 0);
        assert!(run.started_at.is_none());
    }

    #[test]
    fn test_apply_sets_timestamps() {
        let mut run = run();
        run.apply(TaskRunUpdate::status(RunStatus::Queued)).unwrap();
        run.apply(TaskRunUpdate::status(RunStatus::Running)).unwrap();
        assert!(run.started_at.is_some());

        run.apply(TaskRunUpdate::status(RunStatus::Completed).with_result("done"))
            .unwrap();
        assert!(run.completed_at.is_some());
        assert_eq!(run.result.as_deref(), Some("done"));
    }

    #[test]
    fn test_apply_rejects_leaving_terminal() {
        let mut run = run();
        run.apply(TaskRunUpdate::status(RunStatus::Cancelled)).unwrap();

        let err = run
            .apply(TaskRunUpdate::status(RunStatus::Running))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidStateTransition { .. }));
        assert_eq!(run.status, RunStatus::Cancelled);
    }

    #[test]
    fn test_apply_rejects_skipping_queue() {
        let mut run = run();
        let err = run
            .apply(TaskRunUpdate::status(RunStatus::Running))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidStateTransition {
                from: RunStatus::Pending,
                to: RunStatus::Running
            }
        ));
    }

    #[test]
    fn test_error_clears_result() {
        let mut run = run();
        run.apply(TaskRunUpdate::default().with_result("partial")).unwrap();
        run.apply(TaskRunUpdate::default().with_error("boom")).unwrap();
        assert!(run.result.is_none());
        assert_eq!(run.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_tokens_never_decrease() {
        let mut run = run();
        run.apply(TaskRunUpdate::default().with_tokens(10, 5)).unwrap();
        assert!(run.apply(TaskRunUpdate::default().with_tokens(9, 5)).is_err());
        assert_eq!(run.tokens_input, 10);
    }

    #[test]
    fn test_serde_uses_camel_case() {
        let value = serde_json::to_value(run()).unwrap();
        assert!(value.get("tokensInput").is_some());
        assert!(value.get("createdAt").is_some());
        assert_eq!(value["status"], "pending");
    }
}
