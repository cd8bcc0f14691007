//! HTTP request handlers.

mod events;
mod health;
mod runs;
mod webhooks;

pub use events::stream_events;
pub use health::{health_check, metrics_handler};
pub use runs::{cancel_run, create_run, get_run, submit_input};
pub use webhooks::{create_webhook, delete_webhook, list_webhooks, test_webhook, update_webhook};
