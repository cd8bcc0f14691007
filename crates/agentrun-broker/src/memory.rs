//! In-process broker backend.

use std::collections::{BTreeMap, HashMap};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use agentrun_core::{HumanInput, RunId, StreamId, StreamMessage, TaskEvent, TaskRun};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::futures::Notified;
use tokio::sync::{Notify, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::entry::{decode_payload, StreamEntry};
use crate::keys::{event_stream_key, input_stream_key, TASKS_PENDING};
use crate::{BrokerError, QueueStats, TaskStreamService};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// An append-only log with monotonically increasing ids.
struct Log {
    entries: Vec<StreamEntry>,
    last_id: StreamId,
    last_append: Instant,
}

impl Log {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            last_id: StreamId::ZERO,
            last_append: Instant::now(),
        }
    }

    fn append(&mut self, fields: Vec<(String, String)>) -> StreamId {
        let id = self.last_id.next(now_ms());
        self.last_id = id;
        self.last_append = Instant::now();
        self.entries.push(StreamEntry { id, fields });
        id
    }

    /// Entries with an id strictly greater than `id`.
    fn after(&self, id: &StreamId) -> &[StreamEntry] {
        let start = self.entries.partition_point(|e| e.id <= *id);
        &self.entries[start..]
    }

    /// Entries with an id greater than or equal to `id`.
    fn from(&self, id: &StreamId) -> &[StreamEntry] {
        let start = self.entries.partition_point(|e| e.id < *id);
        &self.entries[start..]
    }
}

/// A consumer group's cursor and its claimed-but-unacked entries.
struct Group {
    last_delivered: StreamId,
    /// Pending entry id -> consumer that claimed it.
    pending: BTreeMap<StreamId, String>,
}

impl Group {
    /// Lowest id this group may still need.
    fn low_water_mark(&self) -> StreamId {
        match self.pending.keys().next() {
            Some(first) => *first,
            None => self.last_delivered.next(0),
        }
    }
}

struct Queue {
    log: Log,
    groups: HashMap<String, Group>,
    max_len: usize,
}

impl Queue {
    /// Trim the oldest entries beyond `max_len`. Only entries every group has
    /// claimed and acknowledged are dropped, so nothing is lost to a group.
    fn trim(&mut self) {
        let excess = self.log.entries.len().saturating_sub(self.max_len);
        if excess == 0 {
            return;
        }
        let Some(mark) = self.groups.values().map(Group::low_water_mark).min() else {
            return;
        };
        let done = self.log.entries.partition_point(|e| e.id < mark).min(excess);
        if done > 0 {
            self.log.entries.drain(..done);
        }
    }
}

/// Default bound on retained work queue entries.
pub const DEFAULT_QUEUE_MAX_LEN: usize = 10_000;

/// Deadline for a blocking read. `None` when `block` is too far out to be
/// represented, which waits without a deadline.
fn deadline_after(block: Duration) -> Option<Instant> {
    Instant::now().checked_add(block)
}

/// Wait for `notified` until `deadline`. Returns `false` on timeout.
async fn notified_before(deadline: Option<Instant>, notified: Pin<&mut Notified<'_>>) -> bool {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, notified).await.is_ok(),
        None => {
            notified.await;
            true
        }
    }
}

struct EventStream {
    log: Log,
    terminal: bool,
}

/// Input channel with a read cursor. Unread entries are pending decisions.
struct InputChannel {
    log: Log,
    cursor: StreamId,
}

impl InputChannel {
    fn new() -> Self {
        Self {
            log: Log::new(),
            cursor: StreamId::ZERO,
        }
    }

    fn has_pending(&self) -> bool {
        !self.log.after(&self.cursor).is_empty()
    }

    fn take(&mut self) -> Option<StreamEntry> {
        let entry = self.log.after(&self.cursor).first()?.clone();
        self.cursor = entry.id;
        Some(entry)
    }
}

/// [`TaskStreamService`] backed by process memory.
///
/// Readers blocked on one of the logs are woken through a [`Notify`] per log
/// kind and re-check their condition under the lock.
pub struct MemoryBroker {
    queue: RwLock<Queue>,
    events: RwLock<HashMap<RunId, EventStream>>,
    inputs: RwLock<HashMap<RunId, InputChannel>>,
    queue_notify: Notify,
    events_notify: Notify,
    inputs_notify: Notify,
    closed: AtomicBool,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            queue: RwLock::new(Queue {
                log: Log::new(),
                groups: HashMap::new(),
                max_len: DEFAULT_QUEUE_MAX_LEN,
            }),
            events: RwLock::new(HashMap::new()),
            inputs: RwLock::new(HashMap::new()),
            queue_notify: Notify::new(),
            events_notify: Notify::new(),
            inputs_notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Builder method to bound the work queue. Acknowledged entries stay
    /// readable by groups created later until the queue grows past `max_len`.
    pub fn with_queue_max_len(mut self, max_len: usize) -> Self {
        self.queue.get_mut().max_len = max_len;
        self
    }

    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Unavailable("broker closed".to_string()));
        }
        Ok(())
    }

    fn decode_all<T: DeserializeOwned>(key: &str, entries: &[StreamEntry]) -> Vec<StreamMessage<T>> {
        entries
            .iter()
            .filter_map(|entry| match decode_payload(entry) {
                Ok(msg) => Some(msg),
                Err(e) => {
                    warn!(stream = %key, error = %e, "Skipping malformed entry");
                    None
                }
            })
            .collect()
    }

    /// Claim new entries for `consumer` without waiting.
    async fn claim(
        &self,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamMessage<TaskRun>>, BrokerError> {
        let mut queue = self.queue.write().await;
        let Queue { log, groups, .. } = &mut *queue;
        let state = groups
            .get_mut(group)
            .ok_or_else(|| BrokerError::NoSuchGroup(group.to_string()))?;

        let claimed: Vec<StreamEntry> = log
            .after(&state.last_delivered)
            .iter()
            .take(count)
            .cloned()
            .collect();
        for entry in &claimed {
            state.pending.insert(entry.id, consumer.to_string());
            state.last_delivered = entry.id;
        }

        let mut messages = Vec::with_capacity(claimed.len());
        for entry in &claimed {
            match decode_payload(entry) {
                Ok(msg) => messages.push(msg),
                Err(e) => {
                    // Poison entry: acknowledge so no consumer sees it again.
                    warn!(id = %entry.id, error = %e, "Dropping malformed queue entry");
                    state.pending.remove(&entry.id);
                }
            }
        }
        Ok(messages)
    }
}

#[async_trait]
impl TaskStreamService for MemoryBroker {
    async fn create_consumer_group(&self, group: &str) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut queue = self.queue.write().await;
        if !queue.groups.contains_key(group) {
            queue.groups.insert(
                group.to_string(),
                Group {
                    last_delivered: StreamId::ZERO,
                    pending: BTreeMap::new(),
                },
            );
            debug!(group = %group, stream = TASKS_PENDING, "Created consumer group");
        }
        Ok(())
    }

    async fn enqueue_task(&self, run: &TaskRun) -> Result<StreamId, BrokerError> {
        self.ensure_open()?;
        let fields = StreamEntry::task_run_fields(run)?;
        let id = {
            let mut queue = self.queue.write().await;
            let id = queue.log.append(fields);
            queue.trim();
            id
        };
        self.queue_notify.notify_waiters();
        debug!(run_id = %run.id, message_id = %id, "Enqueued task run");
        Ok(id)
    }

    async fn consume_tasks(
        &self,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamMessage<TaskRun>>, BrokerError> {
        let deadline = deadline_after(block);
        loop {
            self.ensure_open()?;
            let notified = self.queue_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let messages = self.claim(group, consumer, count.max(1)).await?;
            if !messages.is_empty() || block.is_zero() {
                return Ok(messages);
            }
            if !notified_before(deadline, notified).await {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack_task(&self, group: &str, id: &StreamId) -> Result<bool, BrokerError> {
        self.ensure_open()?;
        let mut queue = self.queue.write().await;
        let state = queue
            .groups
            .get_mut(group)
            .ok_or_else(|| BrokerError::NoSuchGroup(group.to_string()))?;
        match state.pending.remove(id) {
            Some(consumer) => {
                debug!(group = %group, consumer = %consumer, message_id = %id, "Acknowledged");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn publish_event(
        &self,
        run_id: &RunId,
        event: &TaskEvent,
    ) -> Result<StreamId, BrokerError> {
        self.ensure_open()?;
        let fields = StreamEntry::event_fields(event)?;
        let id = {
            let mut events = self.events.write().await;
            let stream = events.entry(run_id.clone()).or_insert_with(|| EventStream {
                log: Log::new(),
                terminal: false,
            });
            stream.terminal |= event.is_terminal();
            stream.log.append(fields)
        };
        self.events_notify.notify_waiters();
        debug!(run_id = %run_id, event = %event.event_type(), message_id = %id, "Published event");
        Ok(id)
    }

    async fn event_history(
        &self,
        run_id: &RunId,
        from: Option<&StreamId>,
        count: usize,
    ) -> Result<Vec<StreamMessage<TaskEvent>>, BrokerError> {
        self.ensure_open()?;
        let events = self.events.read().await;
        let Some(stream) = events.get(run_id) else {
            return Ok(Vec::new());
        };
        let entries = stream.log.from(from.unwrap_or(&StreamId::ZERO));
        let entries = &entries[..entries.len().min(count)];
        Ok(Self::decode_all(&event_stream_key(run_id), entries))
    }

    async fn subscribe_events(
        &self,
        run_id: &RunId,
        after: &StreamId,
        block: Duration,
    ) -> Result<Vec<StreamMessage<TaskEvent>>, BrokerError> {
        let deadline = deadline_after(block);
        loop {
            self.ensure_open()?;
            let notified = self.events_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let messages = {
                let events = self.events.read().await;
                match events.get(run_id) {
                    Some(stream) => {
                        Self::decode_all(&event_stream_key(run_id), stream.log.after(after))
                    }
                    None => Vec::new(),
                }
            };
            if !messages.is_empty() || block.is_zero() {
                return Ok(messages);
            }
            if !notified_before(deadline, notified).await {
                return Ok(Vec::new());
            }
        }
    }

    async fn publish_input(
        &self,
        run_id: &RunId,
        input: &HumanInput,
    ) -> Result<StreamId, BrokerError> {
        self.ensure_open()?;
        let fields = StreamEntry::input_fields(input)?;
        let id = {
            let mut inputs = self.inputs.write().await;
            let channel = inputs.entry(run_id.clone()).or_insert_with(InputChannel::new);
            if channel.has_pending() {
                return Err(BrokerError::InputAlreadyPending(run_id.to_string()));
            }
            channel.log.append(fields)
        };
        self.inputs_notify.notify_waiters();
        debug!(run_id = %run_id, approved = input.approved, "Published human input");
        Ok(id)
    }

    async fn wait_for_input(
        &self,
        run_id: &RunId,
        timeout: Duration,
    ) -> Result<Option<HumanInput>, BrokerError> {
        let deadline = deadline_after(timeout);
        loop {
            self.ensure_open()?;
            let notified = self.inputs_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let entry = self
                .inputs
                .write()
                .await
                .get_mut(run_id)
                .and_then(InputChannel::take);
            if let Some(entry) = entry {
                return match decode_payload::<HumanInput>(&entry) {
                    Ok(msg) => Ok(Some(msg.data)),
                    Err(e) => {
                        warn!(stream = %input_stream_key(run_id), error = %e, "Malformed human input");
                        Err(e)
                    }
                };
            }
            if timeout.is_zero() {
                return Ok(None);
            }
            if !notified_before(deadline, notified).await {
                return Ok(None);
            }
        }
    }

    async fn event_streams(&self) -> Result<Vec<RunId>, BrokerError> {
        self.ensure_open()?;
        let mut ids: Vec<RunId> = self.events.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn purge_event_streams(&self, retention: Duration) -> Result<usize, BrokerError> {
        self.ensure_open()?;
        let expired: Vec<RunId> = {
            let mut events = self.events.write().await;
            let expired: Vec<RunId> = events
                .iter()
                .filter(|(_, s)| s.terminal && s.log.last_append.elapsed() >= retention)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &expired {
                events.remove(id);
            }
            expired
        };
        if !expired.is_empty() {
            let mut inputs = self.inputs.write().await;
            for id in &expired {
                inputs.remove(id);
            }
            debug!(count = expired.len(), "Purged finished event streams");
        }
        Ok(expired.len())
    }

    async fn queue_stats(&self) -> Result<QueueStats, BrokerError> {
        self.ensure_open()?;
        let queue = self.queue.read().await;
        Ok(QueueStats {
            length: queue.log.entries.len(),
            pending: queue.groups.values().map(|g| g.pending.len()).sum(),
        })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.queue_notify.notify_waiters();
        self.events_notify.notify_waiters();
        self.inputs_notify.notify_waiters();
    }
}
