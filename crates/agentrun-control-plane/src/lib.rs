//! AgentRun Control Plane Library
//!
//! Everything on the producer and observer side of the pipeline: run
//! submission and cancellation, human input, the bounded SSE relay over a
//! run's event stream, webhook delivery driven by the event subscriber, and
//! the HTTP layer tying them together.

pub mod config;
pub mod http;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod service;
pub mod state;
pub mod webhook;

pub use config::{Config, RelayConfig, SubscriberConfig, WebhookConfig};
pub use server::serve;
pub use service::{RunService, ServiceError};
pub use state::AppState;
pub use webhook::{EventSubscriber, WebhookDispatcher};
