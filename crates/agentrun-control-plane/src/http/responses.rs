//! HTTP request and response types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use agentrun_core::{Webhook, WebhookEventType};

// ============================================================================
// Run types
// ============================================================================

/// Request body for `POST /v1/tasks/:task_id/runs`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunRequest {
    pub agent_id: String,
    pub prompt: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub variables: Option<Map<String, Value>>,
}

/// Response body for an accepted human decision.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputAccepted {
    pub accepted: bool,
    pub entry_id: String,
}

// ============================================================================
// Webhook types
// ============================================================================

/// Request body for `POST /v1/webhooks`.
#[derive(Debug, Deserialize)]
pub struct CreateWebhookRequest {
    pub name: String,
    pub url: String,
    pub events: Vec<WebhookEventType>,
}

/// A webhook as listed to its owner. The secret is only shown on creation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub id: String,
    pub name: String,
    pub url: String,
    pub events: Vec<WebhookEventType>,
    pub enabled: bool,
    pub failure_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_triggered_at: Option<String>,
    pub created_at: String,
}

impl From<Webhook> for WebhookResponse {
    fn from(webhook: Webhook) -> Self {
        Self {
            id: webhook.id.to_string(),
            name: webhook.name,
            url: webhook.url,
            events: webhook.events,
            enabled: webhook.enabled,
            failure_count: webhook.failure_count,
            last_triggered_at: webhook.last_triggered_at.map(|t| t.to_rfc3339()),
            created_at: webhook.created_at.to_rfc3339(),
        }
    }
}

/// Response body for `POST /v1/webhooks`.
#[derive(Debug, Serialize)]
pub struct CreatedWebhookResponse {
    #[serde(flatten)]
    pub webhook: WebhookResponse,
    /// Key for verifying `X-Webhook-Signature`.
    pub secret: String,
}

// ============================================================================
// Error types
// ============================================================================

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
