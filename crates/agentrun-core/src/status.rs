//! TaskRun status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a TaskRun.
///
/// ```text
/// pending -> queued -> running <-> waiting_input
///                         |
///                         +-> completed | failed | cancelled
/// ```
///
/// `completed`, `failed` and `cancelled` are terminal: nothing leaves them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created by the producer, not yet on the work queue.
    #[default]
    Pending,
    /// On the work queue, waiting for a worker to claim it.
    Queued,
    /// A worker is driving the agent loop.
    Running,
    /// The agent loop is paused on a human decision.
    WaitingInput,
    /// Finished with a result.
    Completed,
    /// Finished with an error.
    Failed,
    /// Stopped on request.
    Cancelled,
}

impl RunStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [RunStatus; 7] = [
        Self::Pending,
        Self::Queued,
        Self::Running,
        Self::WaitingInput,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
    ];

    /// Returns true if the run is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if the run is still active (not terminal).
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        use RunStatus::*;
        match self {
            Pending => matches!(next, Queued | Cancelled),
            // A queued run can fail if it never reached a worker.
            Queued => matches!(next, Running | Failed | Cancelled),
            Running => matches!(next, WaitingInput | Completed | Failed | Cancelled),
            WaitingInput => matches!(next, Running | Completed | Failed | Cancelled),
            Completed | Failed | Cancelled => false,
        }
    }

    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::WaitingInput => "waiting_input",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in RunStatus::ALL.iter().filter(|s| s.is_terminal()) {
            for to in RunStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn test_happy_path() {
        assert!(RunStatus::Pending.can_transition_to(RunStatus::Queued));
        assert!(RunStatus::Queued.can_transition_to(RunStatus::Running));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Completed));
    }

    #[test]
    fn test_waiting_input_only_from_running() {
        for from in RunStatus::ALL {
            let allowed = from.can_transition_to(RunStatus::WaitingInput);
            assert_eq!(allowed, from == RunStatus::Running, "from {from}");
        }
        assert!(RunStatus::WaitingInput.can_transition_to(RunStatus::Running));
        assert!(RunStatus::WaitingInput.can_transition_to(RunStatus::Failed));
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&RunStatus::WaitingInput).unwrap();
        assert_eq!(json, "\"waiting_input\"");
        let parsed: RunStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(parsed, RunStatus::Cancelled);
    }
}
