//! Tails run event streams and forwards events to webhooks.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use agentrun_broker::{BrokerError, TaskStreamService};
use agentrun_core::{RunId, StreamId, TaskEvent};
use agentrun_store::TaskRunRepository;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::SubscriberConfig;
use crate::webhook::WebhookDispatcher;

const TAIL_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Discovers run event streams and keeps one self-terminating tail per run.
pub struct EventSubscriber {
    broker: Arc<dyn TaskStreamService>,
    runs: Arc<dyn TaskRunRepository>,
    dispatcher: Arc<WebhookDispatcher>,
    config: SubscriberConfig,
    /// Runs with a live tail.
    active: Mutex<HashSet<RunId>>,
    /// Runs whose tail saw a terminal event; never tailed again.
    finished: Mutex<HashSet<RunId>>,
    tails: TaskTracker,
}

impl EventSubscriber {
    pub fn new(
        broker: Arc<dyn TaskStreamService>,
        runs: Arc<dyn TaskRunRepository>,
        dispatcher: Arc<WebhookDispatcher>,
        config: SubscriberConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            broker,
            runs,
            dispatcher,
            config,
            active: Mutex::new(HashSet::new()),
            finished: Mutex::new(HashSet::new()),
            tails: TaskTracker::new(),
        })
    }

    /// Poll for new streams until `shutdown` fires, then wait for the tails.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Event subscriber started"
        );

        loop {
            if let Err(e) = self.poll_once(&shutdown).await {
                warn!(error = %e, "Event stream poll failed");
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        self.tails.close();
        self.tails.wait().await;
        info!("Event subscriber stopped");
    }

    /// One discovery pass: drop expired streams, then start a tail for every
    /// stream not already tailed or finished. Returns how many tails started.
    pub async fn poll_once(self: &Arc<Self>, shutdown: &CancellationToken) -> Result<usize, BrokerError> {
        let purged = self
            .broker
            .purge_event_streams(self.config.event_retention)
            .await?;
        if purged > 0 {
            debug!(purged, "Dropped expired event streams");
        }

        let streams = self.broker.event_streams().await?;
        {
            let live: HashSet<&RunId> = streams.iter().collect();
            self.finished.lock().await.retain(|id| live.contains(id));
        }

        let mut started = 0;
        for run_id in streams {
            if self.finished.lock().await.contains(&run_id) {
                continue;
            }
            if !self.active.lock().await.insert(run_id.clone()) {
                continue;
            }

            debug!(run_id = %run_id, "Tailing run events");
            let subscriber = self.clone();
            let shutdown = shutdown.clone();
            self.tails
                .spawn(async move { subscriber.tail(run_id, shutdown).await });
            started += 1;
        }
        Ok(started)
    }

    /// Runs with a live tail.
    pub async fn active_tails(&self) -> usize {
        self.active.lock().await.len()
    }

    /// Runs whose tail has seen a terminal event and whose stream is still
    /// retained.
    pub async fn finished_runs(&self) -> usize {
        self.finished.lock().await.len()
    }

    async fn tail(&self, run_id: RunId, shutdown: CancellationToken) {
        let mut last = StreamId::ZERO;

        'tail: loop {
            let batch = tokio::select! {
                _ = shutdown.cancelled() => break,
                batch = self.broker.subscribe_events(&run_id, &last, self.config.tail_block) => batch,
            };

            match batch {
                Ok(messages) => {
                    for message in messages {
                        last = message.id;
                        self.forward(&run_id, &message.data).await;
                        if message.data.is_terminal() {
                            self.finished.lock().await.insert(run_id.clone());
                            info!(run_id = %run_id, "Run finished, tail stopped");
                            break 'tail;
                        }
                    }
                }
                Err(e) => {
                    warn!(run_id = %run_id, error = %e, "Event tail read failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(TAIL_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        self.active.lock().await.remove(&run_id);
    }

    async fn forward(&self, run_id: &RunId, event: &TaskEvent) {
        let run = match self.runs.find_by_id(run_id).await {
            Ok(Some(run)) => run,
            Ok(None) => {
                warn!(run_id = %run_id, "Run not found, event not forwarded");
                return;
            }
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Run lookup failed, event not forwarded");
                return;
            }
        };

        match self.dispatcher.dispatch(&run.user_id, event).await {
            Ok(0) => {}
            Ok(sent) => {
                debug!(run_id = %run_id, event = %event.event_type(), webhooks = sent, "Event forwarded")
            }
            Err(e) => warn!(run_id = %run_id, error = %e, "Webhook dispatch failed"),
        }
    }
}
