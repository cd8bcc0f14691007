//! Core domain errors.

use thiserror::Error;

use crate::RunStatus;

/// Core domain errors for AgentRun.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Task run not found.
    #[error("Task run not found: {0}")]
    RunNotFound(String),

    /// Webhook not found.
    #[error("Webhook not found: {0}")]
    WebhookNotFound(String),

    /// The run status machine does not allow this move.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: RunStatus, to: RunStatus },

    /// Stream id could not be parsed.
    #[error("Invalid stream id: {0}")]
    InvalidStreamId(String),

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
