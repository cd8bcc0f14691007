//! Task execution: per-run workspace, logger and tools around the agent loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use agentrun_broker::TaskStreamService;
use agentrun_core::{RunId, TaskEvent, TaskRun};
use agentrun_llm::Usage;
use agentrun_store::TaskRunRepository;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::agent::AgentLoop;
use crate::context::{ExecutionContext, ExecutionResult};
use crate::tools::ToolRegistry;
use crate::{RunLogger, WorkerError};

/// Executes claimed runs.
pub struct TaskExecutor {
    broker: Arc<dyn TaskStreamService>,
    runs: Arc<dyn TaskRunRepository>,
    agent: AgentLoop,
    data_dir: PathBuf,
    tools: Arc<ToolRegistry>,
}

impl TaskExecutor {
    pub fn new(
        broker: Arc<dyn TaskStreamService>,
        runs: Arc<dyn TaskRunRepository>,
        agent: AgentLoop,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            broker,
            runs,
            agent,
            data_dir: data_dir.into(),
            tools: Arc::new(ToolRegistry::with_builtin_tools()),
        }
    }

    /// Builder method to replace the tool set.
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    /// `<data_dir>/runs/<run_id>`.
    pub fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.data_dir.join("runs").join(run_id.as_str())
    }

    /// Execute a run to a terminal outcome.
    ///
    /// Infrastructure failures underneath the agent loop are turned into a
    /// failed result here, announced with a best-effort `TASK_FAILED` and
    /// carrying the tokens already spent.
    pub async fn execute(&self, run: TaskRun, cancel: CancellationToken) -> ExecutionResult {
        let run_id = run.id.clone();
        info!(run_id = %run_id, task_id = %run.task_id, "Executing task run");

        let ctx = match self.prepare(run, cancel).await {
            Ok(ctx) => ctx,
            Err(e) => return self.fail(&run_id, &e, Usage::default()).await,
        };

        match self.agent.run(&ctx).await {
            Ok(result) => result,
            Err(e) => {
                ctx.logger.error(format!("Execution error: {}", e.source)).await;
                self.fail(&run_id, &e.source, e.usage).await
            }
        }
    }

    async fn prepare(
        &self,
        run: TaskRun,
        cancel: CancellationToken,
    ) -> Result<ExecutionContext, WorkerError> {
        let run_dir = self.run_dir(&run.id);
        let work_dir = prepare_workspace(&run_dir).await?;
        let logger = RunLogger::create(&run_dir, run.id.clone()).await?;
        logger.log("Task execution started").await;
        logger.log(format!("Workspace: {}", work_dir.display())).await;

        Ok(ExecutionContext {
            run,
            run_dir,
            work_dir,
            logger,
            tools: self.tools.clone(),
            broker: self.broker.clone(),
            runs: self.runs.clone(),
            cancel,
        })
    }

    async fn fail(&self, run_id: &RunId, error: &WorkerError, usage: Usage) -> ExecutionResult {
        error!(run_id = %run_id, error = %error, "Task execution failed");
        let message = error.to_string();
        if let Err(publish_err) = self
            .broker
            .publish_event(run_id, &TaskEvent::failed(run_id.clone(), message.clone()))
            .await
        {
            warn!(run_id = %run_id, error = %publish_err, "Failed to publish TASK_FAILED");
        }
        ExecutionResult::failed(message, usage)
    }
}

/// Create `<run_dir>/workspace` and return its canonical path.
async fn prepare_workspace(run_dir: &Path) -> std::io::Result<PathBuf> {
    let work_dir = run_dir.join("workspace");
    tokio::fs::create_dir_all(&work_dir).await?;
    tokio::fs::canonicalize(&work_dir).await
}
