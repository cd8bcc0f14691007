//! Task run lifecycle events.
//!
//! Events are immutable, append-only facts about a run. Their order within a
//! run's stream is the authoritative progress timeline, and
//! `TASK_COMPLETED`/`TASK_FAILED` mark the end of that stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::RunId;

/// A lifecycle event of a task run.
///
/// Serialized as `{"type": "TASK_STARTED", "taskRunId": ..., ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum TaskEvent {
    /// The worker began executing the run.
    TaskStarted {
        task_run_id: RunId,
        timestamp: DateTime<Utc>,
    },
    /// A tool invocation is about to run.
    StepStarted { task_run_id: RunId, step: TaskStep },
    /// A tool invocation finished (successfully or not).
    StepCompleted { task_run_id: RunId, step: TaskStep },
    /// A free-form log line.
    LogAppended { task_run_id: RunId, line: String },
    /// The run paused for a human decision.
    HumanInputNeeded {
        task_run_id: RunId,
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options: Option<Vec<String>>,
        /// Milliseconds the run waits before giving up.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
    },
    /// Coarse progress, 0-100.
    TaskProgress { task_run_id: RunId, progress: u8 },
    /// Terminal: the run produced a result.
    TaskCompleted { task_run_id: RunId, result: String },
    /// Terminal: the run failed or was cancelled.
    TaskFailed { task_run_id: RunId, error: String },
}

impl TaskEvent {
    /// Create a TaskStarted event stamped with the current time.
    pub fn started(task_run_id: RunId) -> Self {
        Self::TaskStarted {
            task_run_id,
            timestamp: Utc::now(),
        }
    }

    /// Create a StepStarted event for a tool call.
    pub fn step_started(task_run_id: RunId, tool_name: &str, input: Value) -> Self {
        Self::StepStarted {
            task_run_id,
            step: TaskStep::new(tool_name).with_input(input),
        }
    }

    /// Create a StepCompleted event for a tool call.
    pub fn step_completed(task_run_id: RunId, tool_name: &str, output: Option<String>) -> Self {
        let mut step = TaskStep::new(tool_name);
        step.output = output.map(Value::String);
        Self::StepCompleted { task_run_id, step }
    }

    /// Create a TaskCompleted event.
    pub fn completed(task_run_id: RunId, result: impl Into<String>) -> Self {
        Self::TaskCompleted {
            task_run_id,
            result: result.into(),
        }
    }

    /// Create a TaskFailed event.
    pub fn failed(task_run_id: RunId, error: impl Into<String>) -> Self {
        Self::TaskFailed {
            task_run_id,
            error: error.into(),
        }
    }

    /// Discriminant of this event.
    pub fn event_type(&self) -> TaskEventType {
        match self {
            Self::TaskStarted { .. } => TaskEventType::TaskStarted,
            Self::StepStarted { .. } => TaskEventType::StepStarted,
            Self::StepCompleted { .. } => TaskEventType::StepCompleted,
            Self::LogAppended { .. } => TaskEventType::LogAppended,
            Self::HumanInputNeeded { .. } => TaskEventType::HumanInputNeeded,
            Self::TaskProgress { .. } => TaskEventType::TaskProgress,
            Self::TaskCompleted { .. } => TaskEventType::TaskCompleted,
            Self::TaskFailed { .. } => TaskEventType::TaskFailed,
        }
    }

    /// Run this event belongs to.
    pub fn task_run_id(&self) -> &RunId {
        match self {
            Self::TaskStarted { task_run_id, .. }
            | Self::StepStarted { task_run_id, .. }
            | Self::StepCompleted { task_run_id, .. }
            | Self::LogAppended { task_run_id, .. }
            | Self::HumanInputNeeded { task_run_id, .. }
            | Self::TaskProgress { task_run_id, .. }
            | Self::TaskCompleted { task_run_id, .. }
            | Self::TaskFailed { task_run_id, .. } => task_run_id,
        }
    }

    /// Returns true for end-of-stream events.
    pub fn is_terminal(&self) -> bool {
        self.event_type().is_terminal()
    }
}

/// Type tag of a [`TaskEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskEventType {
    TaskStarted,
    StepStarted,
    StepCompleted,
    LogAppended,
    HumanInputNeeded,
    TaskProgress,
    TaskCompleted,
    TaskFailed,
}

impl TaskEventType {
    /// Wire name, identical to the `type` tag of the serialized event.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskStarted => "TASK_STARTED",
            Self::StepStarted => "STEP_STARTED",
            Self::StepCompleted => "STEP_COMPLETED",
            Self::LogAppended => "LOG_APPENDED",
            Self::HumanInputNeeded => "HUMAN_INPUT_NEEDED",
            Self::TaskProgress => "TASK_PROGRESS",
            Self::TaskCompleted => "TASK_COMPLETED",
            Self::TaskFailed => "TASK_FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TaskCompleted | Self::TaskFailed)
    }
}

impl fmt::Display for TaskEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tool invocation boundary carried by step events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStep {
    /// Tool name.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

impl TaskStep {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder method to set the tool input.
    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let event = TaskEvent::completed(RunId::new("run-1"), "done");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({"type": "TASK_COMPLETED", "taskRunId": "run-1", "result": "done"})
        );
    }

    #[test]
    fn test_parse_human_input_needed() {
        let raw = r#"{"type":"HUMAN_INPUT_NEEDED","taskRunId":"r","prompt":"Deploy?","options":["yes","no"]}"#;
        let event: TaskEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.event_type(), TaskEventType::HumanInputNeeded);
        match event {
            TaskEvent::HumanInputNeeded { options, timeout, .. } => {
                assert_eq!(options.unwrap(), vec!["yes", "no"]);
                assert!(timeout.is_none());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_type_tag_matches_as_str() {
        let events = vec![
            TaskEvent::started(RunId::new("r")),
            TaskEvent::step_started(RunId::new("r"), "shell", json!({"command": "ls"})),
            TaskEvent::step_completed(RunId::new("r"), "shell", Some("ok".into())),
            TaskEvent::TaskProgress {
                task_run_id: RunId::new("r"),
                progress: 10,
            },
            TaskEvent::failed(RunId::new("r"), "boom"),
        ];
        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], event.event_type().as_str());
        }
    }

    #[test]
    fn test_terminal_events() {
        assert!(TaskEvent::completed(RunId::new("r"), "").is_terminal());
        assert!(TaskEvent::failed(RunId::new("r"), "").is_terminal());
        assert!(!TaskEvent::started(RunId::new("r")).is_terminal());
    }
}
