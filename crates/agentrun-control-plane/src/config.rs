//! Control plane configuration.

use std::net::SocketAddr;
use std::time::Duration;

use agentrun_worker::WorkerConfig;

/// Control plane configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server bind address.
    pub http_addr: SocketAddr,

    /// Workers run in this process.
    pub workers: usize,

    pub worker: WorkerConfig,
    pub subscriber: SubscriberConfig,
    pub webhooks: WebhookConfig,
    pub relay: RelayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            workers: 2,
            worker: WorkerConfig::default(),
            subscriber: SubscriberConfig::default(),
            webhooks: WebhookConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

/// Event subscriber configuration.
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// How often event streams are rediscovered.
    pub poll_interval: Duration,

    /// How long one tail read blocks.
    pub tail_block: Duration,

    /// Finished event streams older than this are dropped.
    pub event_retention: Duration,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            tail_block: Duration::from_secs(5),
            event_retention: Duration::from_secs(60 * 60),
        }
    }
}

/// Webhook delivery configuration.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Per-delivery request timeout.
    pub timeout: Duration,

    /// Consecutive failures after which a webhook is disabled.
    pub disable_threshold: u32,

    pub user_agent: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            disable_threshold: 4,
            user_agent: "AgentRun-Webhook/1.0".to_string(),
        }
    }
}

/// Server-sent event relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Events replayed before live tailing starts.
    pub history_count: usize,

    /// How long one live read blocks.
    pub subscribe_block: Duration,

    /// Wall-clock budget of one streaming session.
    pub session_budget: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            history_count: 100,
            subscribe_block: Duration::from_secs(5),
            session_budget: Duration::from_secs(30),
        }
    }
}
