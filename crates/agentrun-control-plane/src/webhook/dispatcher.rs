//! Signed webhook delivery.

use std::sync::Arc;

use agentrun_core::{TaskEvent, UserId, Webhook, WebhookEventType, WebhookId};
use agentrun_store::{StoreError, WebhookRepository};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use hmac::{Hmac, Mac};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::Serialize;
use serde_json::{json, Value};
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::WebhookConfig;

type HmacSha256 = Hmac<Sha256>;

pub const WEBHOOK_ID_HEADER: &str = "X-Webhook-Id";
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Errors that can occur while delivering a webhook.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Webhook endpoint answered with status {0}")]
    Status(u16),

    #[error("Invalid signing secret")]
    InvalidSecret,

    #[error("Failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Body POSTed to webhook endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    /// Unique per delivery.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event: WebhookEventType,
    pub data: Value,
}

/// Outcome of a test delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestDelivery {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Hex HMAC-SHA256 of `body` keyed with `secret`.
pub fn sign(body: &[u8], secret: &str) -> Result<String, DispatchError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| DispatchError::InvalidSecret)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Fans run events out to the owner's webhooks.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    webhooks: Arc<dyn WebhookRepository>,
    config: WebhookConfig,
}

impl WebhookDispatcher {
    pub fn new(
        webhooks: Arc<dyn WebhookRepository>,
        config: WebhookConfig,
    ) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            webhooks,
            config,
        })
    }

    /// Deliver `event` to every enabled webhook of `user_id` subscribed to
    /// its public event type. Returns how many webhooks were attempted.
    ///
    /// Deliveries run concurrently and independently. A failed delivery
    /// only affects its own webhook's failure count.
    pub async fn dispatch(&self, user_id: &UserId, event: &TaskEvent) -> Result<usize, DispatchError> {
        let Some(event_type) = WebhookEventType::from_task_event(event) else {
            return Ok(0);
        };

        let eligible: Vec<Webhook> = self
            .webhooks
            .find_by_user(user_id)
            .await?
            .into_iter()
            .filter(|webhook| webhook.accepts(event_type))
            .collect();
        if eligible.is_empty() {
            return Ok(0);
        }

        let data = serde_json::to_value(event)?;
        join_all(
            eligible
                .iter()
                .map(|webhook| self.deliver_and_record(webhook, event_type, data.clone())),
        )
        .await;
        Ok(eligible.len())
    }

    /// Send a signed `task.started` test payload to one of the caller's
    /// webhooks. Failure counters are left alone.
    pub async fn send_test(
        &self,
        webhook_id: &WebhookId,
        user_id: &UserId,
    ) -> Result<TestDelivery, DispatchError> {
        let webhook = match self.webhooks.find_by_id(webhook_id).await? {
            Some(webhook) if &webhook.user_id == user_id => webhook,
            _ => {
                return Ok(TestDelivery {
                    success: false,
                    status: None,
                    error: Some("Webhook not found".to_string()),
                })
            }
        };

        let data = json!({"taskRunId": "test-run-id", "test": true});
        let delivery = match self
            .deliver(&webhook, WebhookEventType::TaskStarted, data)
            .await
        {
            Ok(status) => TestDelivery {
                success: true,
                status: Some(status),
                error: None,
            },
            Err(DispatchError::Status(status)) => TestDelivery {
                success: false,
                status: Some(status),
                error: None,
            },
            Err(e) => TestDelivery {
                success: false,
                status: None,
                error: Some(e.to_string()),
            },
        };
        Ok(delivery)
    }

    async fn deliver_and_record(&self, webhook: &Webhook, event_type: WebhookEventType, data: Value) {
        let recorded = match self.deliver(webhook, event_type, data).await {
            Ok(status) => {
                debug!(webhook_id = %webhook.id, event = %event_type, status, "Webhook delivered");
                self.webhooks.reset_failure_count(&webhook.id).await
            }
            Err(e) => {
                warn!(webhook_id = %webhook.id, event = %event_type, error = %e, "Webhook delivery failed");
                self.webhooks
                    .increment_failure_count(&webhook.id, self.config.disable_threshold)
                    .await
            }
        };
        if let Err(e) = recorded {
            warn!(webhook_id = %webhook.id, error = %e, "Failed to record webhook delivery");
        }
    }

    /// POST one signed payload. Returns the status code on 2xx.
    async fn deliver(
        &self,
        webhook: &Webhook,
        event_type: WebhookEventType,
        data: Value,
    ) -> Result<u16, DispatchError> {
        let payload = WebhookPayload {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event: event_type,
            data,
        };
        let body = serde_json::to_vec(&payload)?;
        let signature = sign(&body, &webhook.secret)?;

        let response = self
            .client
            .post(&webhook.url)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, &self.config.user_agent)
            .header(WEBHOOK_ID_HEADER, webhook.id.as_str())
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err(DispatchError::Status(status.as_u16()))
        }
    }
}
