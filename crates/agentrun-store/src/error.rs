//! Store errors.

use agentrun_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Domain rule violated or record missing.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Backend cannot be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether the error means the record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Core(CoreError::RunNotFound(_) | CoreError::WebhookNotFound(_))
        )
    }
}
