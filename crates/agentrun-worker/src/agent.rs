//! The agent tool-calling loop.

use std::sync::Arc;
use std::time::Duration;

use agentrun_core::{TaskEvent, TaskRunUpdate};
use agentrun_llm::{ContentBlock, MessageParam, MessageRequest, ModelClient, StopReason, ToolCall, Usage};
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::context::{ExecutionContext, ExecutionResult};
use crate::human::{self, HumanInputOutcome};
use crate::tools::ToolResult;
use crate::{LoopError, WorkerError};

const RESULT_PREVIEW_CHARS: usize = 500;
const DEFAULT_HUMAN_INPUT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Drives one run's conversation with the model until it completes, fails,
/// is cancelled or runs out of iterations.
pub struct AgentLoop {
    model: Arc<dyn ModelClient>,
    config: AgentConfig,
    human_input_timeout: Duration,
}

/// What a tool step asks the loop to do next.
enum StepFlow {
    Continue(ToolResult),
    Stop(ExecutionResult),
}

impl AgentLoop {
    pub fn new(model: Arc<dyn ModelClient>, config: AgentConfig) -> Self {
        Self {
            model,
            config,
            human_input_timeout: DEFAULT_HUMAN_INPUT_TIMEOUT,
        }
    }

    /// Longest wait for `request_human_input`, and the wait used when the
    /// model asks for none.
    pub fn with_human_input_timeout(mut self, timeout: Duration) -> Self {
        self.human_input_timeout = timeout;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run the loop.
    ///
    /// Every terminal outcome is announced on the run's event stream before
    /// this returns. `Err` is only returned when the broker or store fails
    /// underneath the loop, and carries the tokens spent up to that point.
    pub async fn run(&self, ctx: &ExecutionContext) -> Result<ExecutionResult, LoopError> {
        let mut usage = Usage::default();
        match self.drive(ctx, &mut usage).await {
            Ok(result) => Ok(result),
            Err(source) => Err(LoopError { usage, source }),
        }
    }

    async fn drive(
        &self,
        ctx: &ExecutionContext,
        usage: &mut Usage,
    ) -> Result<ExecutionResult, WorkerError> {
        let run_id = ctx.run_id().clone();
        let max_iterations = self.config.max_iterations;

        let system = ctx
            .run
            .system_prompt
            .clone()
            .unwrap_or_else(|| self.config.system_prompt.clone());
        let mut tools = ctx.tools.definitions();
        tools.push(human::definition());
        let mut request = MessageRequest::new(
            self.config.model.clone(),
            self.config.max_tokens,
            vec![MessageParam::user_text(ctx.run.prompt.clone())],
        )
        .with_system(system)
        .with_tools(tools);

        ctx.publish(TaskEvent::started(run_id.clone())).await?;
        ctx.logger
            .log(format!("Agent loop started (model: {})", self.config.model))
            .await;
        info!(run_id = %run_id, model = %self.config.model, "Agent loop started");

        for iteration in 1..=max_iterations {
            if ctx.cancel.is_cancelled() {
                ctx.logger
                    .log(format!("Cancelled before iteration {iteration}"))
                    .await;
                ctx.publish(TaskEvent::failed(run_id.clone(), "Task cancelled"))
                    .await?;
                return Ok(ExecutionResult::cancelled(*usage));
            }

            debug!(run_id = %run_id, iteration, "Calling model");
            let response = match self.model.create_message(&request).await {
                Ok(response) => response,
                Err(e) => {
                    let message = e.to_string();
                    ctx.logger.error(format!("Model call failed: {message}")).await;
                    ctx.publish(TaskEvent::failed(run_id.clone(), message.clone()))
                        .await?;
                    return Ok(ExecutionResult::failed(message, *usage));
                }
            };

            *usage += response.usage;
            ctx.logger
                .log(format!(
                    "Iteration {iteration}: stop_reason={:?}, tokens in={} out={}",
                    response.stop_reason, response.usage.input_tokens, response.usage.output_tokens
                ))
                .await;

            let calls = response.tool_calls();
            request
                .messages
                .push(MessageParam::assistant(response.content.clone()));

            if response.stop_reason != Some(StopReason::ToolUse) || calls.is_empty() {
                if response.stop_reason == Some(StopReason::MaxTokens) {
                    warn!(run_id = %run_id, iteration, "Response truncated at max_tokens");
                }
                let output = response.text().unwrap_or_default().to_string();
                ctx.logger.log("Agent finished").await;
                ctx.publish(TaskEvent::completed(run_id.clone(), output.clone()))
                    .await?;
                info!(run_id = %run_id, iterations = iteration, "Agent loop completed");
                return Ok(ExecutionResult::completed(output, *usage));
            }

            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                match self.step(ctx, &call, *usage).await? {
                    StepFlow::Continue(result) => {
                        results.push(ContentBlock::tool_result(
                            call.id,
                            result.content_for_model(),
                            !result.success,
                        ));
                    }
                    StepFlow::Stop(outcome) => return Ok(outcome),
                }
            }
            request.messages.push(MessageParam::tool_results(results));

            let progress = progress_after(iteration, max_iterations);
            ctx.publish(TaskEvent::TaskProgress {
                task_run_id: run_id.clone(),
                progress,
            })
            .await?;
            ctx.runs
                .update(&run_id, TaskRunUpdate::default().with_progress(progress))
                .await?;
        }

        let message = format!("Max iterations ({max_iterations}) reached");
        ctx.logger.error(&message).await;
        ctx.publish(TaskEvent::failed(run_id, message.clone())).await?;
        Ok(ExecutionResult::failed(message, *usage))
    }

    /// Execute one tool call between its STEP_STARTED and STEP_COMPLETED events.
    async fn step(
        &self,
        ctx: &ExecutionContext,
        call: &ToolCall,
        usage: Usage,
    ) -> Result<StepFlow, WorkerError> {
        let run_id = ctx.run_id().clone();
        ctx.publish(TaskEvent::step_started(
            run_id.clone(),
            &call.name,
            call.input.clone(),
        ))
        .await?;
        ctx.logger
            .tool(&call.name, format!("Executing with input: {}", call.input))
            .await;

        let result = if call.name == human::TOOL_NAME {
            match human::request(ctx, call.input.clone(), self.human_input_timeout).await? {
                HumanInputOutcome::Answered(result) => result,
                HumanInputOutcome::TimedOut => {
                    let message = "Timed out waiting for human input";
                    ctx.logger.error(message).await;
                    ctx.publish(TaskEvent::failed(run_id, message)).await?;
                    return Ok(StepFlow::Stop(ExecutionResult::failed(message, usage)));
                }
                HumanInputOutcome::Cancelled => {
                    ctx.logger.log("Cancelled while waiting for human input").await;
                    ctx.publish(TaskEvent::failed(run_id, "Task cancelled")).await?;
                    return Ok(StepFlow::Stop(ExecutionResult::cancelled(usage)));
                }
            }
        } else {
            ctx.tools
                .execute(&call.name, call.input.clone(), &ctx.tool_context())
                .await
        };

        let summary = result.summary();
        ctx.logger
            .tool(
                &call.name,
                format!(
                    "Result ({}): {}",
                    if result.success { "ok" } else { "error" },
                    preview(summary.as_deref().unwrap_or_default())
                ),
            )
            .await;
        ctx.publish(TaskEvent::step_completed(run_id, &call.name, summary))
            .await?;

        Ok(StepFlow::Continue(result))
    }
}

/// Progress after a tool iteration. 100 is reserved for completion.
fn progress_after(iteration: u32, max_iterations: u32) -> u8 {
    let percent = u64::from(iteration) * 100 / u64::from(max_iterations.max(1));
    percent.min(99) as u8
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(RESULT_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_is_capped_below_completion() {
        assert_eq!(progress_after(1, 50), 2);
        assert_eq!(progress_after(25, 50), 50);
        assert_eq!(progress_after(50, 50), 99);
        assert_eq!(progress_after(1, 1), 99);
        assert_eq!(progress_after(1, 0), 99);
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("short"), "short");
        let long = "é".repeat(RESULT_PREVIEW_CHARS + 10);
        let cut = preview(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), RESULT_PREVIEW_CHARS + 3);
    }
}
