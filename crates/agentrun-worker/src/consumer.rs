//! The competing-consumer loop.

use std::sync::Arc;

use agentrun_broker::{BrokerError, TaskStreamService};
use agentrun_core::{RunId, RunStatus, StreamMessage, TaskRun, TaskRunUpdate};
use agentrun_store::TaskRunRepository;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::{ExecutionResult, RunOutcome};
use crate::{CancellationRegistry, TaskExecutor, WorkerConfig, WorkerError};

/// One consumer in the worker group.
///
/// Claims runs from the work queue and executes them one at a time. Every
/// claimed entry is acknowledged once its attempt is over, whether it
/// succeeded or not, so a poison entry is never redelivered.
pub struct Worker {
    config: WorkerConfig,
    broker: Arc<dyn TaskStreamService>,
    runs: Arc<dyn TaskRunRepository>,
    executor: Arc<TaskExecutor>,
    cancellations: Arc<CancellationRegistry>,
}

impl Worker {
    pub fn new(
        config: WorkerConfig,
        broker: Arc<dyn TaskStreamService>,
        runs: Arc<dyn TaskRunRepository>,
        executor: Arc<TaskExecutor>,
        cancellations: Arc<CancellationRegistry>,
    ) -> Self {
        Self {
            config,
            broker,
            runs,
            executor,
            cancellations,
        }
    }

    pub fn consumer_id(&self) -> &str {
        &self.config.consumer_id
    }

    /// Consume until `shutdown` fires or the queue keeps failing.
    ///
    /// Joining the group and reading from it share one error budget: each
    /// failure backs off and `max_consecutive_errors` in a row stop the worker.
    ///
    /// A run in progress when `shutdown` fires is finished first; stopping it
    /// early is done through its cancellation token.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), WorkerError> {
        let consumer = self.config.consumer_id.as_str();

        let mut joined = false;
        let mut consecutive_errors: u32 = 0;
        loop {
            let batch = tokio::select! {
                _ = shutdown.cancelled() => break,
                batch = self.next_batch(&mut joined) => batch,
            };

            match batch {
                Ok(messages) => {
                    consecutive_errors = 0;
                    for message in messages {
                        self.process(message).await;
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    if consecutive_errors >= self.config.max_consecutive_errors {
                        error!(
                            consumer = %consumer,
                            errors = consecutive_errors,
                            error = %e,
                            "Too many consecutive queue errors, stopping worker"
                        );
                        return Err(WorkerError::TooManyErrors {
                            count: consecutive_errors,
                            last: e.to_string(),
                        });
                    }

                    let delay = self.config.backoff_for(consecutive_errors);
                    warn!(
                        consumer = %consumer,
                        errors = consecutive_errors,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "Queue read failed"
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        info!(consumer = %consumer, "Worker stopped");
        Ok(())
    }

    /// Join the consumer group on first use, then claim a batch.
    async fn next_batch(
        &self,
        joined: &mut bool,
    ) -> Result<Vec<StreamMessage<TaskRun>>, BrokerError> {
        let group = self.config.consumer_group.as_str();
        if !*joined {
            self.broker.create_consumer_group(group).await?;
            *joined = true;
            info!(group = %group, consumer = %self.config.consumer_id, "Worker joined consumer group");
        }
        self.broker
            .consume_tasks(
                group,
                &self.config.consumer_id,
                self.config.batch_size,
                self.config.block_timeout,
            )
            .await
    }

    /// Handle one claimed entry and acknowledge it.
    pub async fn process(&self, message: StreamMessage<TaskRun>) {
        let run_id = message.data.id.clone();
        debug!(run_id = %run_id, entry_id = %message.id, "Claimed task run");

        if let Err(e) = self.handle(&run_id).await {
            error!(run_id = %run_id, error = %e, "Task run processing failed");
        }

        match self
            .broker
            .ack_task(&self.config.consumer_group, &message.id)
            .await
        {
            Ok(_) => debug!(run_id = %run_id, entry_id = %message.id, "Acknowledged"),
            Err(e) => error!(run_id = %run_id, entry_id = %message.id, error = %e, "Ack failed"),
        }
    }

    async fn handle(&self, run_id: &RunId) -> Result<(), WorkerError> {
        // The record, not the queued payload, is the current state of the run.
        let Some(stored) = self.runs.find_by_id(run_id).await? else {
            warn!(run_id = %run_id, "Queued run has no record, skipping");
            return Ok(());
        };
        if stored.is_terminal() {
            info!(run_id = %run_id, status = %stored.status, "Run already finished, skipping");
            return Ok(());
        }

        let cancel = self.cancellations.register(run_id).await;
        let result = self.execute(run_id, cancel).await;
        self.cancellations.unregister(run_id).await;

        self.record(run_id, &result?).await
    }

    async fn execute(
        &self,
        run_id: &RunId,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, WorkerError> {
        let run_dir = self.executor.run_dir(run_id);
        let run = self
            .runs
            .update(
                run_id,
                TaskRunUpdate::status(RunStatus::Running)
                    .with_local_path(run_dir.display().to_string()),
            )
            .await?;
        Ok(self.executor.execute(run, cancel).await)
    }

    /// Persist the terminal outcome with the tokens spent.
    async fn record(&self, run_id: &RunId, result: &ExecutionResult) -> Result<(), WorkerError> {
        let status = result.outcome.status();
        let mut update = TaskRunUpdate::status(status)
            .with_tokens(result.usage.input_tokens, result.usage.output_tokens);
        update = match result.outcome {
            RunOutcome::Completed => update
                .with_result(result.output.clone().unwrap_or_default())
                .with_progress(100),
            RunOutcome::Failed | RunOutcome::Cancelled => {
                update.with_error(result.error.clone().unwrap_or_default())
            }
        };
        self.runs.update(run_id, update).await?;

        info!(
            run_id = %run_id,
            status = %status,
            tokens_input = result.usage.input_tokens,
            tokens_output = result.usage.output_tokens,
            "Task run finished"
        );
        Ok(())
    }
}
