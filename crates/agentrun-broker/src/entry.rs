//! Wire format of log entries: flat field/value pairs.
//!
//! | stream | fields |
//! |---|---|
//! | work queue | `taskRunId`, `payload` (JSON TaskRun) |
//! | events | `type`, `data` (JSON TaskEvent) |
//! | input | `data` (JSON HumanInput) |

use agentrun_core::{HumanInput, StreamId, StreamMessage, TaskEvent, TaskRun};
use serde::de::DeserializeOwned;

use crate::BrokerError;

/// A raw log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: StreamId,
    pub fields: Vec<(String, String)>,
}

impl StreamEntry {
    /// Value of the first field named `name`.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Fields of a work-queue entry.
    pub fn task_run_fields(run: &TaskRun) -> Result<Vec<(String, String)>, BrokerError> {
        Ok(vec![
            ("taskRunId".to_string(), run.id.to_string()),
            ("payload".to_string(), serde_json::to_string(run)?),
        ])
    }

    /// Fields of an event-stream entry.
    pub fn event_fields(event: &TaskEvent) -> Result<Vec<(String, String)>, BrokerError> {
        Ok(vec![
            ("type".to_string(), event.event_type().as_str().to_string()),
            ("data".to_string(), serde_json::to_string(event)?),
        ])
    }

    /// Fields of an input-channel entry.
    pub fn input_fields(input: &HumanInput) -> Result<Vec<(String, String)>, BrokerError> {
        Ok(vec![("data".to_string(), serde_json::to_string(input)?)])
    }
}

/// Decode the JSON body of an entry, accepting either a `payload` or a
/// `data` field.
pub fn decode_payload<T: DeserializeOwned>(
    entry: &StreamEntry,
) -> Result<StreamMessage<T>, BrokerError> {
    let raw = entry
        .field("payload")
        .or_else(|| entry.field("data"))
        .ok_or_else(|| BrokerError::MalformedEntry {
            id: entry.id.to_string(),
            reason: "missing payload/data field".to_string(),
        })?;
    let data = serde_json::from_str(raw).map_err(|e| BrokerError::MalformedEntry {
        id: entry.id.to_string(),
        reason: e.to_string(),
    })?;
    Ok(StreamMessage::new(entry.id, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrun_core::RunId;

    #[test]
    fn test_event_entry_carries_type_field() {
        let event = TaskEvent::started(RunId::new("r1"));
        let entry = StreamEntry {
            id: StreamId::new(1, 0),
            fields: StreamEntry::event_fields(&event).unwrap(),
        };
        assert_eq!(entry.field("type"), Some("TASK_STARTED"));

        let decoded: StreamMessage<TaskEvent> = decode_payload(&entry).unwrap();
        assert_eq!(decoded.data, event);
        assert_eq!(decoded.id, StreamId::new(1, 0));
    }

    #[test]
    fn test_legacy_field_names_are_accepted() {
        let input = HumanInput::approve(Some("yes".into()));
        let json = serde_json::to_string(&input).unwrap();
        for name in ["payload", "data"] {
            let entry = StreamEntry {
                id: StreamId::new(5, 1),
                fields: vec![(name.to_string(), json.clone())],
            };
            let decoded: StreamMessage<HumanInput> = decode_payload(&entry).unwrap();
            assert_eq!(decoded.data, input);
        }
    }

    #[test]
    fn test_missing_body_is_malformed() {
        let entry = StreamEntry {
            id: StreamId::new(5, 1),
            fields: vec![("type".to_string(), "TASK_STARTED".to_string())],
        };
        let err = decode_payload::<TaskEvent>(&entry).unwrap_err();
        assert!(matches!(err, BrokerError::MalformedEntry { .. }));
    }
}
