//! AgentRun persistence contracts.
//!
//! The pipeline only needs a narrow view of storage: create/find/update for
//! task runs, and CRUD plus failure counters for webhooks. Both contracts are
//! traits so a relational backend can replace the in-memory ones.

mod error;
mod run;
mod webhook;

pub use error::StoreError;
pub use run::{InMemoryTaskRunRepository, TaskRunRepository};
pub use webhook::{generate_webhook_secret, InMemoryWebhookRepository, WebhookRepository};
