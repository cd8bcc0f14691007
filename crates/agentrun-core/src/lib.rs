//! AgentRun Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Queues or event streams
//! - Persistence
//! - Network clients or runtime specifics
//!
//! Everything that crosses a crate boundary in AgentRun (task runs, their
//! lifecycle events, human decisions, webhooks) is defined here.

pub mod error;
pub mod event;
pub mod ids;
pub mod input;
pub mod run;
pub mod status;
pub mod stream;
pub mod webhook;

// Re-export commonly used types
pub use error::CoreError;
pub use event::{TaskEvent, TaskEventType, TaskStep};
pub use ids::{AgentId, RunId, TaskId, UserId, WebhookId};
pub use input::HumanInput;
pub use run::{NewTaskRun, TaskRun, TaskRunUpdate};
pub use status::RunStatus;
pub use stream::{StreamId, StreamMessage};
pub use webhook::{NewWebhook, Webhook, WebhookEventType, WebhookUpdate};
