//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// System prompt used when a run does not bring its own.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant that can execute tasks.";

/// Agent loop configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model identifier sent with every call.
    pub model: String,

    /// Maximum output tokens per model call.
    pub max_tokens: u32,

    /// Upper bound on model calls per run.
    pub max_iterations: u32,

    pub system_prompt: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 4096,
            max_iterations: 50,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Consumer group shared by all competing workers.
    pub consumer_group: String,

    /// Name of this consumer within the group.
    pub consumer_id: String,

    /// Root of `runs/<run_id>/{workspace,logs}`.
    pub data_dir: PathBuf,

    /// Entries claimed per read.
    pub batch_size: usize,

    /// How long one read blocks waiting for work.
    pub block_timeout: Duration,

    /// Consecutive queue errors after which the worker gives up.
    pub max_consecutive_errors: u32,

    /// Delay after the first queue error; doubles per consecutive error.
    pub error_backoff: Duration,

    /// Cap on the queue error delay.
    pub max_error_backoff: Duration,

    /// Longest wait for a human decision.
    pub human_input_timeout: Duration,

    /// How long in-flight runs may keep going after shutdown starts.
    pub shutdown_grace: Duration,

    pub agent: AgentConfig,
}

impl WorkerConfig {
    /// Consumer id for the `n`th worker of this process.
    pub fn consumer_id_for(n: usize) -> String {
        format!("worker-{}-{}", std::process::id(), n)
    }

    /// Builder method to set the consumer id.
    pub fn with_consumer_id(mut self, consumer_id: impl Into<String>) -> Self {
        self.consumer_id = consumer_id.into();
        self
    }

    /// Delay before retrying after `consecutive_errors` failed reads.
    pub fn backoff_for(&self, consecutive_errors: u32) -> Duration {
        let exponent = consecutive_errors.saturating_sub(1).min(16);
        self.error_backoff
            .saturating_mul(1 << exponent)
            .min(self.max_error_backoff)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            consumer_group: "workers".to_string(),
            consumer_id: Self::consumer_id_for(0),
            data_dir: PathBuf::from("data"),
            batch_size: 1,
            block_timeout: Duration::from_secs(5),
            max_consecutive_errors: 10,
            error_backoff: Duration::from_secs(1),
            max_error_backoff: Duration::from_secs(30),
            human_input_timeout: Duration::from_secs(60 * 60),
            shutdown_grace: Duration::from_secs(5),
            agent: AgentConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = WorkerConfig::default();
        assert_eq!(config.backoff_for(1), Duration::from_secs(1));
        assert_eq!(config.backoff_for(2), Duration::from_secs(2));
        assert_eq!(config.backoff_for(4), Duration::from_secs(8));
        assert_eq!(config.backoff_for(9), Duration::from_secs(30));
        assert_eq!(config.backoff_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_consumer_ids_are_distinct() {
        assert_ne!(WorkerConfig::consumer_id_for(0), WorkerConfig::consumer_id_for(1));
        assert!(WorkerConfig::consumer_id_for(3).starts_with("worker-"));
    }
}
