//! Bounded replay-then-tail sessions over a run's event stream.
//!
//! A session replays history, stops right there if the run is already
//! finished, and otherwise tails live events until a terminal event or the
//! session budget runs out. Clients resume with the last id they saw.

use std::collections::VecDeque;
use std::sync::Arc;

use agentrun_broker::TaskStreamService;
use agentrun_core::{RunId, StreamId, StreamMessage, TaskEvent};
use agentrun_store::TaskRunRepository;
use futures_util::stream::{self, Stream};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::RelayConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    History,
    Live,
    Done,
}

struct Session {
    broker: Arc<dyn TaskStreamService>,
    runs: Arc<dyn TaskRunRepository>,
    run_id: RunId,
    config: RelayConfig,
    /// Resume cursor; only entries after it are sent.
    last: StreamId,
    resuming: bool,
    deadline: Instant,
    buffered: VecDeque<StreamMessage<TaskEvent>>,
    phase: Phase,
}

/// Event stream of one session.
///
/// `resume_after` is the last id the client already has (from
/// `Last-Event-ID`); `None` replays from the start.
pub fn session(
    broker: Arc<dyn TaskStreamService>,
    runs: Arc<dyn TaskRunRepository>,
    run_id: RunId,
    resume_after: Option<StreamId>,
    config: RelayConfig,
) -> impl Stream<Item = StreamMessage<TaskEvent>> + Send {
    let deadline = Instant::now() + config.session_budget;
    let session = Session {
        broker,
        runs,
        run_id,
        config,
        last: resume_after.unwrap_or(StreamId::ZERO),
        resuming: resume_after.is_some(),
        deadline,
        buffered: VecDeque::new(),
        phase: Phase::History,
    };
    stream::unfold(session, |mut session| async move {
        session.next().await.map(|message| (message, session))
    })
}

impl Session {
    async fn next(&mut self) -> Option<StreamMessage<TaskEvent>> {
        loop {
            if let Some(message) = self.buffered.pop_front() {
                return Some(message);
            }
            match self.phase {
                Phase::Done => return None,
                Phase::History => self.replay().await,
                Phase::Live => self.tail().await,
            }
        }
    }

    fn push(&mut self, messages: Vec<StreamMessage<TaskEvent>>) {
        for message in messages {
            if self.resuming && message.id <= self.last {
                continue;
            }
            self.last = message.id;
            let terminal = message.data.is_terminal();
            self.buffered.push_back(message);
            if terminal {
                self.phase = Phase::Done;
                return;
            }
        }
    }

    async fn replay(&mut self) {
        let from = self.resuming.then_some(self.last);
        let history = match self
            .broker
            .event_history(&self.run_id, from.as_ref(), self.config.history_count)
            .await
        {
            Ok(history) => history,
            Err(e) => {
                warn!(run_id = %self.run_id, error = %e, "Event history read failed");
                self.phase = Phase::Done;
                return;
            }
        };
        self.phase = Phase::Live;
        self.push(history);
        if self.phase == Phase::Done {
            return;
        }

        // A finished run has nothing more to say.
        match self.runs.find_by_id(&self.run_id).await {
            Ok(Some(run)) if !run.is_terminal() => {}
            Ok(_) => self.phase = Phase::Done,
            Err(e) => {
                warn!(run_id = %self.run_id, error = %e, "Run lookup failed");
                self.phase = Phase::Done;
            }
        }
    }

    async fn tail(&mut self) {
        let now = Instant::now();
        if now >= self.deadline {
            debug!(run_id = %self.run_id, "Event session budget spent");
            self.phase = Phase::Done;
            return;
        }
        let block = self.config.subscribe_block.min(self.deadline - now);

        match self
            .broker
            .subscribe_events(&self.run_id, &self.last, block)
            .await
        {
            Ok(messages) => self.push(messages),
            Err(e) => {
                warn!(run_id = %self.run_id, error = %e, "Event subscribe failed");
                self.phase = Phase::Done;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrun_broker::MemoryBroker;
    use agentrun_core::{NewTaskRun, RunStatus, TaskEventType, TaskRun, TaskRunUpdate};
    use agentrun_store::InMemoryTaskRunRepository;
    use futures_util::StreamExt;
    use std::time::Duration;

    struct Fixture {
        broker: Arc<MemoryBroker>,
        runs: Arc<InMemoryTaskRunRepository>,
        run_id: RunId,
    }

    async fn fixture(status: RunStatus) -> Fixture {
        let runs = Arc::new(InMemoryTaskRunRepository::new());
        let run = runs
            .create(TaskRun::new(NewTaskRun {
                prompt: "p".to_string(),
                ..Default::default()
            }))
            .await
            .unwrap();
        let path: &[RunStatus] = match status {
            RunStatus::Running => &[RunStatus::Queued, RunStatus::Running],
            RunStatus::Completed => &[RunStatus::Queued, RunStatus::Running, RunStatus::Completed],
            _ => &[],
        };
        for next in path {
            runs.update(&run.id, TaskRunUpdate::status(*next)).await.unwrap();
        }
        Fixture {
            broker: Arc::new(MemoryBroker::new()),
            runs,
            run_id: run.id,
        }
    }

    impl Fixture {
        async fn publish(&self, event: TaskEvent) -> StreamId {
            self.broker.publish_event(&self.run_id, &event).await.unwrap()
        }

        fn session(&self, resume_after: Option<StreamId>) -> impl Stream<Item = StreamMessage<TaskEvent>> {
            session(
                self.broker.clone(),
                self.runs.clone(),
                self.run_id.clone(),
                resume_after,
                RelayConfig::default(),
            )
        }
    }

    fn types(messages: &[StreamMessage<TaskEvent>]) -> Vec<TaskEventType> {
        messages.iter().map(|m| m.data.event_type()).collect()
    }

    #[tokio::test]
    async fn test_finished_run_replays_and_closes() {
        let f = fixture(RunStatus::Completed).await;
        f.publish(TaskEvent::started(f.run_id.clone())).await;
        f.publish(TaskEvent::completed(f.run_id.clone(), "done")).await;

        let messages: Vec<_> = f.session(None).collect().await;
        assert_eq!(
            types(&messages),
            vec![TaskEventType::TaskStarted, TaskEventType::TaskCompleted]
        );
    }

    #[tokio::test]
    async fn test_terminal_status_without_terminal_event_stops_after_history() {
        let f = fixture(RunStatus::Completed).await;
        f.publish(TaskEvent::started(f.run_id.clone())).await;

        let messages: Vec<_> = tokio::time::timeout(Duration::from_secs(1), f.session(None).collect::<Vec<_>>())
            .await
            .expect("session must not subscribe for a finished run");
        assert_eq!(types(&messages), vec![TaskEventType::TaskStarted]);
    }

    #[tokio::test]
    async fn test_live_events_follow_history_until_terminal() {
        let f = fixture(RunStatus::Running).await;
        f.publish(TaskEvent::started(f.run_id.clone())).await;

        let publisher = {
            let broker = f.broker.clone();
            let run_id = f.run_id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                broker
                    .publish_event(&run_id, &TaskEvent::step_started(run_id.clone(), "shell", serde_json::json!({})))
                    .await
                    .unwrap();
                broker
                    .publish_event(&run_id, &TaskEvent::failed(run_id.clone(), "boom"))
                    .await
                    .unwrap();
                // Never delivered: the session ends at the terminal event.
                broker
                    .publish_event(&run_id, &TaskEvent::started(run_id.clone()))
                    .await
                    .unwrap();
            })
        };

        let messages: Vec<_> = f.session(None).collect().await;
        publisher.await.unwrap();
        assert_eq!(
            types(&messages),
            vec![
                TaskEventType::TaskStarted,
                TaskEventType::StepStarted,
                TaskEventType::TaskFailed
            ]
        );
        assert!(messages.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn test_resume_skips_seen_events() {
        let f = fixture(RunStatus::Completed).await;
        let first = f.publish(TaskEvent::started(f.run_id.clone())).await;
        f.publish(TaskEvent::completed(f.run_id.clone(), "done")).await;

        let messages: Vec<_> = f.session(Some(first)).collect().await;
        assert_eq!(types(&messages), vec![TaskEventType::TaskCompleted]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_budget_closes_quiet_stream() {
        let f = fixture(RunStatus::Running).await;
        f.publish(TaskEvent::started(f.run_id.clone())).await;

        let started = Instant::now();
        let messages: Vec<_> = f.session(None).collect().await;
        assert_eq!(types(&messages), vec![TaskEventType::TaskStarted]);
        assert!(started.elapsed() >= RelayConfig::default().session_budget);
    }
}
