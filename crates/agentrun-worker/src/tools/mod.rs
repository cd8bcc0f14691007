//! Tools the agent can call.
//!
//! Every file-touching tool resolves its paths through
//! [`sandbox::resolve_real_path`] before reading or writing anything.

mod file;
mod registry;
pub mod sandbox;
mod shell;

use std::path::PathBuf;
use std::time::Duration;

use agentrun_core::RunId;
use agentrun_llm::ToolDefinition;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::RunLogger;

pub use file::{ListDirectoryTool, ReadFileTool, WriteFileTool};
pub use registry::{RegistryError, ToolRegistry};
pub use shell::ShellTool;

/// Errors raised inside a tool. The registry turns them into failed results.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The requested path resolves outside the run workspace.
    #[error("Path traversal not allowed: {0}")]
    PathEscapesWorkspace(String),

    #[error("Command timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }

    /// Text sent back to the model as the tool result.
    pub fn content_for_model(&self) -> String {
        if self.success {
            match self.output.as_deref() {
                Some(out) if !out.is_empty() => out.to_string(),
                _ => "(no output)".to_string(),
            }
        } else {
            format!("Error: {}", self.error.as_deref().unwrap_or("unknown error"))
        }
    }

    /// Output for success, error detail for failure.
    pub fn summary(&self) -> Option<String> {
        if self.success {
            self.output.clone()
        } else {
            self.error.clone()
        }
    }
}

/// Per-call context handed to tools.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub run_id: RunId,
    /// Absolute workspace root. Tools never touch anything outside it.
    pub work_dir: PathBuf,
    pub logger: RunLogger,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the input object.
    fn input_schema(&self) -> Value;

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Decode a tool's input object.
pub(crate) fn parse_input<T: DeserializeOwned>(input: Value) -> Result<T, ToolError> {
    serde_json::from_value(input).map_err(|e| ToolError::InvalidInput(e.to_string()))
}
