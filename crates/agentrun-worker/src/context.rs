//! Execution context and result of a single run.

use std::path::PathBuf;
use std::sync::Arc;

use agentrun_broker::{BrokerError, TaskStreamService};
use agentrun_core::{RunId, RunStatus, StreamId, TaskEvent, TaskRun};
use agentrun_llm::Usage;
use agentrun_store::TaskRunRepository;
use tokio_util::sync::CancellationToken;

use crate::tools::{ToolContext, ToolRegistry};
use crate::RunLogger;

/// Everything the agent loop needs for one run.
pub struct ExecutionContext {
    pub run: TaskRun,
    /// `<data_dir>/runs/<run_id>`.
    pub run_dir: PathBuf,
    /// Absolute workspace root the tools are confined to.
    pub work_dir: PathBuf,
    pub logger: RunLogger,
    pub tools: Arc<ToolRegistry>,
    pub broker: Arc<dyn TaskStreamService>,
    pub runs: Arc<dyn TaskRunRepository>,
    pub cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn run_id(&self) -> &RunId {
        &self.run.id
    }

    /// Append an event to this run's stream.
    pub async fn publish(&self, event: TaskEvent) -> Result<StreamId, BrokerError> {
        self.broker.publish_event(&self.run.id, &event).await
    }

    pub fn tool_context(&self) -> ToolContext {
        ToolContext {
            run_id: self.run.id.clone(),
            work_dir: self.work_dir.clone(),
            logger: self.logger.clone(),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed,
    Cancelled,
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        match self {
            Self::Completed => RunStatus::Completed,
            Self::Failed => RunStatus::Failed,
            Self::Cancelled => RunStatus::Cancelled,
        }
    }
}

/// Result of executing a run. Token usage is reported on every path.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub outcome: RunOutcome,
    pub output: Option<String>,
    pub error: Option<String>,
    pub usage: Usage,
}

impl ExecutionResult {
    pub fn completed(output: impl Into<String>, usage: Usage) -> Self {
        Self {
            outcome: RunOutcome::Completed,
            output: Some(output.into()),
            error: None,
            usage,
        }
    }

    pub fn failed(error: impl Into<String>, usage: Usage) -> Self {
        Self {
            outcome: RunOutcome::Failed,
            output: None,
            error: Some(error.into()),
            usage,
        }
    }

    pub fn cancelled(usage: Usage) -> Self {
        Self {
            outcome: RunOutcome::Cancelled,
            output: None,
            error: Some("Task cancelled".to_string()),
            usage,
        }
    }
}
