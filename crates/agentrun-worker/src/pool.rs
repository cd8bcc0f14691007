//! A set of competing workers running in this process.

use std::sync::Arc;
use std::time::Duration;

use agentrun_broker::TaskStreamService;
use agentrun_store::TaskRunRepository;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{CancellationRegistry, TaskExecutor, Worker, WorkerConfig};

/// `count` workers sharing one consumer group, executor and cancellation
/// registry.
pub struct WorkerPool {
    workers: JoinSet<()>,
    shutdown: CancellationToken,
    cancellations: Arc<CancellationRegistry>,
    grace: Duration,
}

impl WorkerPool {
    /// Spawn the workers. Worker `n` consumes as `worker-<pid>-<n>`.
    pub fn spawn(
        count: usize,
        config: WorkerConfig,
        broker: Arc<dyn TaskStreamService>,
        runs: Arc<dyn TaskRunRepository>,
        executor: Arc<TaskExecutor>,
        cancellations: Arc<CancellationRegistry>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let mut workers = JoinSet::new();

        for n in 0..count {
            let worker = Worker::new(
                config
                    .clone()
                    .with_consumer_id(WorkerConfig::consumer_id_for(n)),
                broker.clone(),
                runs.clone(),
                executor.clone(),
                cancellations.clone(),
            );
            let shutdown = shutdown.clone();
            workers.spawn(async move {
                if let Err(e) = worker.run(shutdown).await {
                    error!(consumer = %worker.consumer_id(), error = %e, "Worker exited");
                }
            });
        }
        info!(count, group = %config.consumer_group, "Worker pool started");

        Self {
            workers,
            shutdown,
            cancellations,
            grace: config.shutdown_grace,
        }
    }

    /// Workers still running.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn cancellations(&self) -> Arc<CancellationRegistry> {
        self.cancellations.clone()
    }

    /// Stop claiming new runs without waiting for in-flight ones.
    pub fn stop_claiming(&self) {
        self.shutdown.cancel();
    }

    /// Stop claiming new runs and wait for in-flight runs up to the grace
    /// period. Runs still going after that are cancelled through their tokens
    /// and get another grace period to record the outcome; workers that are
    /// still stuck after it are aborted.
    pub async fn shutdown(mut self) {
        info!(grace_secs = self.grace.as_secs(), "Stopping workers");
        self.stop_claiming();

        if self.join_within(self.grace).await {
            info!("Workers stopped");
            return;
        }

        let cancelled = self.cancellations.cancel_all().await;
        warn!(cancelled, "Grace period elapsed, cancelling in-flight runs");
        if !self.join_within(self.grace).await {
            warn!(remaining = self.workers.len(), "Workers did not stop, aborting");
            self.workers.shutdown().await;
        }
        info!("Workers stopped");
    }

    /// Wait for every worker to exit. Returns `false` when `limit` elapses
    /// first.
    async fn join_within(&mut self, limit: Duration) -> bool {
        tokio::time::timeout(limit, async {
            while let Some(joined) = self.workers.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "Worker task ended abnormally");
                }
            }
        })
        .await
        .is_ok()
    }
}
