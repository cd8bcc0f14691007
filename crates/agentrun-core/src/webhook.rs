//! Webhook registrations and the public event vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{TaskEvent, UserId, WebhookId};

/// Public event names webhooks can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookEventType {
    #[serde(rename = "task.started")]
    TaskStarted,
    #[serde(rename = "task.completed")]
    TaskCompleted,
    #[serde(rename = "task.failed")]
    TaskFailed,
    #[serde(rename = "task.waiting_input")]
    TaskWaitingInput,
}

impl WebhookEventType {
    /// Public event for an internal one.
    ///
    /// Steps, log lines and progress stay internal and are never forwarded.
    pub fn from_task_event(event: &TaskEvent) -> Option<Self> {
        match event {
            TaskEvent::TaskStarted { .. } => Some(Self::TaskStarted),
            TaskEvent::TaskCompleted { .. } => Some(Self::TaskCompleted),
            TaskEvent::TaskFailed { .. } => Some(Self::TaskFailed),
            TaskEvent::HumanInputNeeded { .. } => Some(Self::TaskWaitingInput),
            TaskEvent::StepStarted { .. }
            | TaskEvent::StepCompleted { .. }
            | TaskEvent::LogAppended { .. }
            | TaskEvent::TaskProgress { .. } => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskStarted => "task.started",
            Self::TaskCompleted => "task.completed",
            Self::TaskFailed => "task.failed",
            Self::TaskWaitingInput => "task.waiting_input",
        }
    }
}

impl fmt::Display for WebhookEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP endpoint notified about a user's runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub id: WebhookId,
    pub user_id: UserId,
    pub name: String,
    pub url: String,
    /// HMAC key for `X-Webhook-Signature`.
    pub secret: String,
    pub events: Vec<WebhookEventType>,
    pub enabled: bool,
    /// Consecutive failed deliveries; reset by any success.
    pub failure_count: u32,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Webhook {
    /// Whether a delivery of `event` should go to this webhook.
    pub fn accepts(&self, event: WebhookEventType) -> bool {
        self.enabled && self.events.contains(&event)
    }
}

/// Registration input for a webhook. The secret is generated by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWebhook {
    pub user_id: UserId,
    pub name: String,
    pub url: String,
    pub events: Vec<WebhookEventType>,
}

/// Owner-editable webhook fields. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub events: Option<Vec<WebhookEventType>>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RunId;

    #[test]
    fn test_event_mapping() {
        let run = RunId::new("r");
        assert_eq!(
            WebhookEventType::from_task_event(&TaskEvent::started(run.clone())),
            Some(WebhookEventType::TaskStarted)
        );
        assert_eq!(
            WebhookEventType::from_task_event(&TaskEvent::failed(run.clone(), "x")),
            Some(WebhookEventType::TaskFailed)
        );
        assert_eq!(
            WebhookEventType::from_task_event(&TaskEvent::TaskProgress {
                task_run_id: run,
                progress: 50
            }),
            None
        );
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&WebhookEventType::TaskWaitingInput).unwrap();
        assert_eq!(json, "\"task.waiting_input\"");
    }
}
