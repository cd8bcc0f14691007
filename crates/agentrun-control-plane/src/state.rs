//! Shared application state.

use std::sync::Arc;

use agentrun_broker::TaskStreamService;
use agentrun_store::{TaskRunRepository, WebhookRepository};
use agentrun_worker::CancellationRegistry;

use crate::config::RelayConfig;
use crate::service::RunService;
use crate::webhook::WebhookDispatcher;

/// Shared application state.
pub struct AppState {
    pub broker: Arc<dyn TaskStreamService>,
    pub runs: Arc<dyn TaskRunRepository>,
    pub webhooks: Arc<dyn WebhookRepository>,

    /// Runs executing in this process, by id.
    pub cancellations: Arc<CancellationRegistry>,

    pub run_service: RunService,
    pub dispatcher: Arc<WebhookDispatcher>,

    /// Settings for `GET /v1/runs/:run_id/events` sessions.
    pub relay: RelayConfig,
}

impl AppState {
    /// Create a new AppState wrapped in Arc.
    pub fn new(
        broker: Arc<dyn TaskStreamService>,
        runs: Arc<dyn TaskRunRepository>,
        webhooks: Arc<dyn WebhookRepository>,
        cancellations: Arc<CancellationRegistry>,
        dispatcher: Arc<WebhookDispatcher>,
        relay: RelayConfig,
    ) -> Arc<Self> {
        let run_service = RunService::new(broker.clone(), runs.clone(), cancellations.clone());
        Arc::new(Self {
            broker,
            runs,
            webhooks,
            cancellations,
            run_service,
            dispatcher,
            relay,
        })
    }
}
