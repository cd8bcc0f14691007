//! HTTP client for the Anthropic messages API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::client::ModelClient;
use crate::error::LlmError;
use crate::types::{MessageRequest, MessageResponse};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// [`ModelClient`] calling `POST /v1/messages`.
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicClient {
    /// Create a client with the default endpoint and timeout.
    pub fn new(api_key: impl Into<String>) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        let client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Builder method to point at another endpoint (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn create_message(&self, request: &MessageRequest) -> Result<MessageResponse, LlmError> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Calling model"
        );

        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            warn!(status = status.as_u16(), error = %message, "Model call failed");
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| LlmError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessageParam, StopReason};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_missing_api_key() {
        assert!(matches!(
            AnthropicClient::new("  "),
            Err(LlmError::MissingApiKey)
        ));
    }

    #[tokio::test]
    async fn test_create_message() {
        let router = Router::new().route(
            "/v1/messages",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["x-api-key"], "test-key");
                assert_eq!(headers["anthropic-version"], ANTHROPIC_VERSION);
                assert_eq!(body["system"], "be brief");
                let model = body["model"].clone();
                Json(json!({
                    "id": "msg_1",
                    "model": model,
                    "content": [{"type": "text", "text": "4"}],
                    "stop_reason": "end_turn",
                    "usage": {"input_tokens": 10, "output_tokens": 1}
                }))
            }),
        );
        let base = serve(router).await;

        let client = AnthropicClient::new("test-key").unwrap().with_base_url(base);
        let response = client
            .create_message(
                &MessageRequest::new("m", 16, vec![MessageParam::user_text("2+2?")])
                    .with_system("be brief"),
            )
            .await
            .unwrap();

        assert_eq!(response.text(), Some("4"));
        assert_eq!(response.stop_reason, Some(StopReason::EndTurn));
        assert_eq!(response.usage.output_tokens, 1);
    }

    #[tokio::test]
    async fn test_api_error_message() {
        let router = Router::new().route(
            "/v1/messages",
            post(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({"type": "error", "error": {"type": "rate_limit_error", "message": "slow down"}})),
                )
            }),
        );
        let base = serve(router).await;

        let client = AnthropicClient::new("k").unwrap().with_base_url(base);
        let err = client
            .create_message(&MessageRequest::new("m", 16, vec![MessageParam::user_text("hi")]))
            .await
            .unwrap_err();
        match err {
            LlmError::Api { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "slow down");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
