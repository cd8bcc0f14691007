//! The model-call seam used by the agent loop.

use async_trait::async_trait;

use crate::error::LlmError;
use crate::types::{MessageRequest, MessageResponse};

/// A conversation-completion backend.
///
/// The agent loop never retries; an `Err` fails the run. Retries, if any,
/// belong to the implementation.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn create_message(&self, request: &MessageRequest) -> Result<MessageResponse, LlmError>;
}
