//! HTTP server for the control plane.
//!
//! Provides endpoints for:
//! - Run submission, lookup, cancellation (`/v1/tasks/:task_id/runs`, `/v1/runs/:run_id`)
//! - Run event streaming over SSE (`/v1/runs/:run_id/events`)
//! - Human input (`/v1/runs/:run_id/input`)
//! - Webhook registration and test delivery (`/v1/webhooks`)
//! - Health check (`/health`)
//! - Prometheus metrics (`/metrics`)
//!
//! Callers identify themselves with an `X-User-Id` header.

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use agentrun_core::UserId;

use crate::state::AppState;

mod error;
mod handlers;
pub mod responses;

pub use error::ApiError;

/// Header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Run routes
        .route("/v1/tasks/:task_id/runs", post(handlers::create_run))
        .route("/v1/runs/:run_id", get(handlers::get_run))
        .route("/v1/runs/:run_id/events", get(handlers::stream_events))
        .route("/v1/runs/:run_id/input", post(handlers::submit_input))
        .route("/v1/runs/:run_id/cancel", post(handlers::cancel_run))
        // Webhook routes
        .route(
            "/v1/webhooks",
            post(handlers::create_webhook).get(handlers::list_webhooks),
        )
        .route(
            "/v1/webhooks/:id",
            patch(handlers::update_webhook).delete(handlers::delete_webhook),
        )
        .route("/v1/webhooks/:id/test", post(handlers::test_webhook))
        // Observability routes
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// The calling user, from the `X-User-Id` header.
#[derive(Debug, Clone)]
pub struct Caller(pub UserId);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Caller(UserId::new(value)))
            .ok_or(ApiError::Unauthorized)
    }
}
