//! Stream key naming.

use agentrun_core::RunId;

/// The shared work queue.
pub const TASKS_PENDING: &str = "stream:tasks:pending";

const RUN_PREFIX: &str = "stream:tasks:";
const EVENTS_SUFFIX: &str = ":events";
const INPUT_SUFFIX: &str = ":input";

/// Key of a run's event stream.
pub fn event_stream_key(run_id: &RunId) -> String {
    format!("{RUN_PREFIX}{run_id}{EVENTS_SUFFIX}")
}

/// Key of a run's human-input channel.
pub fn input_stream_key(run_id: &RunId) -> String {
    format!("{RUN_PREFIX}{run_id}{INPUT_SUFFIX}")
}

/// Recover the run id from an event stream key.
pub fn run_id_from_event_key(key: &str) -> Option<RunId> {
    key.strip_prefix(RUN_PREFIX)?
        .strip_suffix(EVENTS_SUFFIX)
        .filter(|id| !id.is_empty() && !id.contains(':'))
        .map(RunId::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_key_round_trip() {
        let run_id = RunId::new("abc");
        let key = event_stream_key(&run_id);
        assert_eq!(key, "stream:tasks:abc:events");
        assert_eq!(run_id_from_event_key(&key), Some(run_id));
    }

    #[test]
    fn test_non_event_keys_are_ignored() {
        assert_eq!(run_id_from_event_key(TASKS_PENDING), None);
        assert_eq!(run_id_from_event_key("stream:tasks:abc:input"), None);
        assert_eq!(run_id_from_event_key("stream:tasks::events"), None);
    }
}
