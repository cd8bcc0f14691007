//! Broker errors.

use thiserror::Error;

/// Errors surfaced by a [`crate::TaskStreamService`].
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The backend cannot be reached. Callers should back off and retry.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// Reading through a consumer group that was never created.
    #[error("Consumer group not found: {0}")]
    NoSuchGroup(String),

    /// An entry had neither a `payload` nor a `data` field.
    #[error("Malformed stream entry {id}: {reason}")]
    MalformedEntry { id: String, reason: String },

    /// The run already has an undelivered decision.
    #[error("A human input is already pending for run {0}")]
    InputAlreadyPending(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BrokerError {
    /// Whether retrying the same call later can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
