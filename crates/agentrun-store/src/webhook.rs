//! Webhook persistence.

use std::collections::HashMap;

use agentrun_core::{CoreError, NewWebhook, UserId, Webhook, WebhookId, WebhookUpdate};
use async_trait::async_trait;
use chrono::Utc;
use rand::RngCore;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::StoreError;

/// Generate a webhook signing secret: 32 random bytes, hex encoded.
pub fn generate_webhook_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Storage contract for webhooks.
#[async_trait]
pub trait WebhookRepository: Send + Sync {
    /// Register a webhook with a fresh secret. New webhooks start enabled.
    async fn create(&self, input: NewWebhook) -> Result<Webhook, StoreError>;

    async fn find_by_id(&self, id: &WebhookId) -> Result<Option<Webhook>, StoreError>;

    /// All webhooks of a user, oldest first.
    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<Webhook>, StoreError>;

    async fn update(&self, id: &WebhookId, update: WebhookUpdate) -> Result<Webhook, StoreError>;

    /// Returns false if the webhook did not exist.
    async fn delete(&self, id: &WebhookId) -> Result<bool, StoreError>;

    /// Record a failed delivery. The webhook is disabled once its
    /// consecutive failure count reaches `disable_threshold`.
    async fn increment_failure_count(
        &self,
        id: &WebhookId,
        disable_threshold: u32,
    ) -> Result<Webhook, StoreError>;

    /// Record a successful delivery.
    async fn reset_failure_count(&self, id: &WebhookId) -> Result<Webhook, StoreError>;

    /// `(enabled, disabled)` webhook counts.
    async fn count_enabled(&self) -> Result<(usize, usize), StoreError>;
}

/// [`WebhookRepository`] kept in process memory.
#[derive(Default)]
pub struct InMemoryWebhookRepository {
    webhooks: RwLock<HashMap<WebhookId, Webhook>>,
}

impl InMemoryWebhookRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn modify<F>(&self, id: &WebhookId, f: F) -> Result<Webhook, StoreError>
    where
        F: FnOnce(&mut Webhook) + Send,
    {
        let mut webhooks = self.webhooks.write().await;
        let webhook = webhooks
            .get_mut(id)
            .ok_or_else(|| CoreError::WebhookNotFound(id.to_string()))?;
        f(webhook);
        Ok(webhook.clone())
    }
}

#[async_trait]
impl WebhookRepository for InMemoryWebhookRepository {
    async fn create(&self, input: NewWebhook) -> Result<Webhook, StoreError> {
        if input.url.trim().is_empty() {
            return Err(CoreError::InvalidInput("Webhook url is required".to_string()).into());
        }
        let webhook = Webhook {
            id: WebhookId::generate(),
            user_id: input.user_id,
            name: input.name,
            url: input.url,
            secret: generate_webhook_secret(),
            events: input.events,
            enabled: true,
            failure_count: 0,
            last_triggered_at: None,
            created_at: Utc::now(),
        };
        self.webhooks
            .write()
            .await
            .insert(webhook.id.clone(), webhook.clone());
        info!(webhook_id = %webhook.id, user_id = %webhook.user_id, "Webhook created");
        Ok(webhook)
    }

    async fn find_by_id(&self, id: &WebhookId) -> Result<Option<Webhook>, StoreError> {
        Ok(self.webhooks.read().await.get(id).cloned())
    }

    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<Webhook>, StoreError> {
        let mut found: Vec<Webhook> = self
            .webhooks
            .read()
            .await
            .values()
            .filter(|w| &w.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn update(&self, id: &WebhookId, update: WebhookUpdate) -> Result<Webhook, StoreError> {
        if matches!(&update.url, Some(url) if url.trim().is_empty()) {
            return Err(CoreError::InvalidInput("Webhook url is required".to_string()).into());
        }
        self.modify(id, |webhook| {
            if let Some(name) = update.name {
                webhook.name = name;
            }
            if let Some(url) = update.url {
                webhook.url = url;
            }
            if let Some(events) = update.events {
                webhook.events = events;
            }
            if let Some(enabled) = update.enabled {
                webhook.enabled = enabled;
            }
        })
        .await
    }

    async fn delete(&self, id: &WebhookId) -> Result<bool, StoreError> {
        Ok(self.webhooks.write().await.remove(id).is_some())
    }

    async fn increment_failure_count(
        &self,
        id: &WebhookId,
        disable_threshold: u32,
    ) -> Result<Webhook, StoreError> {
        let webhook = self
            .modify(id, |webhook| {
                webhook.failure_count = webhook.failure_count.saturating_add(1);
                webhook.last_triggered_at = Some(Utc::now());
                if webhook.failure_count >= disable_threshold {
                    webhook.enabled = false;
                }
            })
            .await?;
        if !webhook.enabled && webhook.failure_count == disable_threshold {
            warn!(
                webhook_id = %webhook.id,
                failures = webhook.failure_count,
                "Webhook disabled after consecutive failures"
            );
        }
        Ok(webhook)
    }

    async fn reset_failure_count(&self, id: &WebhookId) -> Result<Webhook, StoreError> {
        self.modify(id, |webhook| {
            webhook.failure_count = 0;
            webhook.last_triggered_at = Some(Utc::now());
        })
        .await
    }

    async fn count_enabled(&self) -> Result<(usize, usize), StoreError> {
        let webhooks = self.webhooks.read().await;
        let enabled = webhooks.values().filter(|w| w.enabled).count();
        Ok((enabled, webhooks.len() - enabled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrun_core::WebhookEventType;

    fn new_webhook(user: &str) -> NewWebhook {
        NewWebhook {
            user_id: UserId::new(user),
            name: "ci".to_string(),
            url: "http://localhost:9/hook".to_string(),
            events: vec![WebhookEventType::TaskFailed],
        }
    }

    #[test]
    fn test_secret_is_32_random_bytes() {
        let a = generate_webhook_secret();
        let b = generate_webhook_secret();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_create_and_find_by_user() {
        let repo = InMemoryWebhookRepository::new();
        let hook = repo.create(new_webhook("alice")).await.unwrap();
        repo.create(new_webhook("bob")).await.unwrap();

        assert!(hook.enabled);
        assert_eq!(hook.failure_count, 0);
        let mine = repo.find_by_user(&UserId::new("alice")).await.unwrap();
        assert_eq!(mine, vec![hook]);
    }

    #[tokio::test]
    async fn test_disabled_at_threshold() {
        let repo = InMemoryWebhookRepository::new();
        let hook = repo.create(new_webhook("alice")).await.unwrap();

        for expected in 1..4 {
            let updated = repo.increment_failure_count(&hook.id, 4).await.unwrap();
            assert_eq!(updated.failure_count, expected);
            assert!(updated.enabled);
        }
        let updated = repo.increment_failure_count(&hook.id, 4).await.unwrap();
        assert_eq!(updated.failure_count, 4);
        assert!(!updated.enabled);
        assert!(updated.last_triggered_at.is_some());
        assert_eq!(repo.count_enabled().await.unwrap(), (0, 1));
    }

    #[tokio::test]
    async fn test_reenable_keeps_count_until_success() {
        let repo = InMemoryWebhookRepository::new();
        let hook = repo.create(new_webhook("alice")).await.unwrap();
        for _ in 0..4 {
            repo.increment_failure_count(&hook.id, 4).await.unwrap();
        }

        let reenabled = repo
            .update(
                &hook.id,
                WebhookUpdate {
                    enabled: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(reenabled.enabled);
        assert_eq!(reenabled.failure_count, 4);

        let reset = repo.reset_failure_count(&hook.id).await.unwrap();
        assert_eq!(reset.failure_count, 0);
        assert!(reset.enabled);
    }

    #[tokio::test]
    async fn test_update_rejects_empty_url() {
        let repo = InMemoryWebhookRepository::new();
        let hook = repo.create(new_webhook("alice")).await.unwrap();
        let err = repo
            .update(
                &hook.id,
                WebhookUpdate {
                    url: Some("  ".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Core(CoreError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = InMemoryWebhookRepository::new();
        let hook = repo.create(new_webhook("alice")).await.unwrap();
        assert!(repo.delete(&hook.id).await.unwrap());
        assert!(!repo.delete(&hook.id).await.unwrap());
        let err = repo.reset_failure_count(&hook.id).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
