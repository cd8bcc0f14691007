//! The `request_human_input` tool.
//!
//! Unlike the registry tools this one needs the broker and the run record,
//! so the agent loop handles it directly.

use std::time::Duration;

use agentrun_core::{RunStatus, TaskEvent, TaskRunUpdate};
use agentrun_llm::ToolDefinition;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::context::ExecutionContext;
use crate::tools::ToolResult;
use crate::WorkerError;

pub const TOOL_NAME: &str = "request_human_input";

#[derive(Debug, Deserialize)]
struct HumanInputRequest {
    prompt: String,
    #[serde(default)]
    options: Option<Vec<String>>,
    #[serde(default)]
    timeout_seconds: Option<u64>,
}

/// How a wait for a human decision ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HumanInputOutcome {
    /// A decision arrived; the result goes back to the model.
    Answered(ToolResult),
    TimedOut,
    Cancelled,
}

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: TOOL_NAME.to_string(),
        description: "Ask a human for approval or a choice before continuing. \
                      The run pauses until a decision arrives."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "Question shown to the human"
                },
                "options": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Choices to offer, if any"
                },
                "timeout_seconds": {
                    "type": "number",
                    "description": "How long to wait for a decision"
                }
            },
            "required": ["prompt"]
        }),
    }
}

/// Wait requested by the model, bounded by `max_timeout`.
fn wait_for(timeout_seconds: Option<u64>, max_timeout: Duration) -> Duration {
    timeout_seconds
        .map(Duration::from_secs)
        .map_or(max_timeout, |requested| requested.min(max_timeout))
}

/// Pause the run on a human decision.
///
/// Moves the run to `waiting_input`, announces `HUMAN_INPUT_NEEDED` and waits
/// on the input channel. The model may ask for a shorter wait than
/// `max_timeout`, never a longer one. The run goes back to `running` only
/// when a decision arrives; on timeout or cancellation the caller ends the
/// run.
pub async fn request(
    ctx: &ExecutionContext,
    input: Value,
    max_timeout: Duration,
) -> Result<HumanInputOutcome, WorkerError> {
    let request: HumanInputRequest = match serde_json::from_value(input) {
        Ok(request) => request,
        Err(e) => {
            return Ok(HumanInputOutcome::Answered(ToolResult::fail(format!(
                "Invalid input: {e}"
            ))))
        }
    };
    let timeout = wait_for(request.timeout_seconds, max_timeout);

    ctx.runs
        .update(ctx.run_id(), TaskRunUpdate::status(RunStatus::WaitingInput))
        .await?;
    ctx.publish(TaskEvent::HumanInputNeeded {
        task_run_id: ctx.run_id().clone(),
        prompt: request.prompt.clone(),
        options: request.options,
        timeout: Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)),
    })
    .await?;
    ctx.logger
        .log(format!("Waiting for human input: {}", request.prompt))
        .await;
    info!(run_id = %ctx.run_id(), timeout_secs = timeout.as_secs(), "Run waiting for human input");

    let decision = tokio::select! {
        _ = ctx.cancel.cancelled() => return Ok(HumanInputOutcome::Cancelled),
        decision = ctx.broker.wait_for_input(ctx.run_id(), timeout) => decision?,
    };

    let Some(decision) = decision else {
        warn!(run_id = %ctx.run_id(), "No human input before timeout");
        return Ok(HumanInputOutcome::TimedOut);
    };

    ctx.runs
        .update(ctx.run_id(), TaskRunUpdate::status(RunStatus::Running))
        .await?;

    let result = if decision.approved {
        ctx.logger.log("Human input: approved").await;
        ToolResult::ok(decision.value.unwrap_or_else(|| "Approved".to_string()))
    } else {
        let reason = decision
            .reason
            .unwrap_or_else(|| "Rejected by user".to_string());
        ctx.logger.log(format!("Human input: rejected ({reason})")).await;
        ToolResult::fail(reason)
    };
    Ok(HumanInputOutcome::Answered(result))
}
