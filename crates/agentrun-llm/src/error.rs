//! Error types for model calls.

use thiserror::Error;

/// Errors that can occur while calling the model.
#[derive(Debug, Error)]
pub enum LlmError {
    /// No API key configured.
    #[error("ANTHROPIC_API_KEY is not set")]
    MissingApiKey,

    /// Transport failure (connect, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response body did not match the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(String),
}
