//! AgentRun message broker.
//!
//! Three kinds of append-only logs back the execution pipeline:
//!
//! - the shared **work queue** (`stream:tasks:pending`), consumed by competing
//!   workers through consumer groups with per-entry acknowledgment;
//! - one **event stream** per run (`stream:tasks:<id>:events`), replayable
//!   and readable by any number of observers;
//! - one **input channel** per run (`stream:tasks:<id>:input`) carrying at
//!   most one pending human decision.
//!
//! All of it sits behind [`TaskStreamService`]; [`MemoryBroker`] is the
//! in-process backend.

mod entry;
mod error;
mod keys;
mod memory;
mod service;

pub use entry::{decode_payload, StreamEntry};
pub use error::BrokerError;
pub use keys::{event_stream_key, input_stream_key, run_id_from_event_key, TASKS_PENDING};
pub use memory::{MemoryBroker, DEFAULT_QUEUE_MAX_LEN};
pub use service::{QueueStats, TaskStreamService};
