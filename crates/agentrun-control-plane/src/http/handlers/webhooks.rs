//! Webhook registration and test delivery handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use agentrun_core::{NewWebhook, Webhook, WebhookId, WebhookUpdate};

use crate::http::responses::{CreateWebhookRequest, CreatedWebhookResponse, WebhookResponse};
use crate::http::{ApiError, Caller};
use crate::state::AppState;
use crate::webhook::TestDelivery;

fn validate_url(url: &str) -> Result<(), ApiError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| ApiError::bad_request(format!("Invalid webhook url: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ApiError::bad_request(format!(
            "Unsupported webhook url scheme: {other}"
        ))),
    }
}

/// Caller's webhook, or not found.
async fn owned(state: &AppState, id: &WebhookId, caller: &Caller) -> Result<Webhook, ApiError> {
    match state.webhooks.find_by_id(id).await? {
        Some(webhook) if webhook.user_id == caller.0 => Ok(webhook),
        _ => Err(ApiError::not_found(format!("Webhook not found: {id}"))),
    }
}

/// Register a webhook. The response is the only place the secret is shown.
pub async fn create_webhook(
    State(state): State<Arc<AppState>>,
    Caller(user_id): Caller,
    Json(req): Json<CreateWebhookRequest>,
) -> Result<(StatusCode, Json<CreatedWebhookResponse>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("name must not be empty"));
    }
    validate_url(&req.url)?;
    if req.events.is_empty() {
        return Err(ApiError::bad_request("events must not be empty"));
    }

    let webhook = state
        .webhooks
        .create(NewWebhook {
            user_id,
            name: req.name,
            url: req.url,
            events: req.events,
        })
        .await?;
    info!(webhook_id = %webhook.id, user_id = %webhook.user_id, "Webhook registered");

    let secret = webhook.secret.clone();
    Ok((
        StatusCode::CREATED,
        Json(CreatedWebhookResponse {
            webhook: webhook.into(),
            secret,
        }),
    ))
}

pub async fn list_webhooks(
    State(state): State<Arc<AppState>>,
    Caller(user_id): Caller,
) -> Result<Json<Vec<WebhookResponse>>, ApiError> {
    let webhooks = state.webhooks.find_by_user(&user_id).await?;
    Ok(Json(webhooks.into_iter().map(WebhookResponse::from).collect()))
}

/// Edit a webhook. Re-enabling one does not clear its failure count; the
/// next successful delivery does.
pub async fn update_webhook(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<WebhookId>,
    Json(update): Json<WebhookUpdate>,
) -> Result<Json<WebhookResponse>, ApiError> {
    owned(&state, &id, &caller).await?;
    if let Some(url) = &update.url {
        validate_url(url)?;
    }
    if update.events.as_ref().is_some_and(Vec::is_empty) {
        return Err(ApiError::bad_request("events must not be empty"));
    }

    let webhook = state.webhooks.update(&id, update).await?;
    Ok(Json(webhook.into()))
}

pub async fn delete_webhook(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<WebhookId>,
) -> Result<StatusCode, ApiError> {
    owned(&state, &id, &caller).await?;
    state.webhooks.delete(&id).await?;
    info!(webhook_id = %id, "Webhook deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Send a signed test payload. Delivery failures are reported in the body.
pub async fn test_webhook(
    State(state): State<Arc<AppState>>,
    Caller(user_id): Caller,
    Path(id): Path<WebhookId>,
) -> Result<Json<TestDelivery>, ApiError> {
    Ok(Json(state.dispatcher.send_test(&id, &user_id).await?))
}
