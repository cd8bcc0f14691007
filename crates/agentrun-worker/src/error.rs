//! Worker errors.

use agentrun_broker::BrokerError;
use agentrun_llm::Usage;
use agentrun_store::StoreError;
use thiserror::Error;

/// Errors that stop a run or the worker itself.
///
/// Tool failures never surface here; they are reported to the model as
/// failed tool results.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The consumption loop hit its consecutive error ceiling.
    #[error("Giving up after {count} consecutive queue errors, last: {last}")]
    TooManyErrors { count: u32, last: String },
}

/// The agent loop stopped on a [`WorkerError`] after spending `usage`.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct LoopError {
    pub usage: Usage,
    #[source]
    pub source: WorkerError,
}
