//! Name-indexed tool dispatch.

use std::collections::BTreeMap;
use std::sync::Arc;

use agentrun_llm::ToolDefinition;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::{ListDirectoryTool, ReadFileTool, ShellTool, Tool, ToolContext, ToolResult, WriteFileTool};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Tool \"{0}\" is already registered")]
    Duplicate(String),
}

/// Tools available to the agent, keyed by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `shell`, `read_file`, `write_file` and `list_directory`.
    pub fn with_builtin_tools() -> Self {
        let mut registry = Self::new();
        let builtins: [Arc<dyn Tool>; 4] = [
            Arc::new(ShellTool::default()),
            Arc::new(ReadFileTool),
            Arc::new(WriteFileTool),
            Arc::new(ListDirectoryTool),
        ];
        for tool in builtins {
            let name = tool.name().to_string();
            registry.tools.insert(name, tool);
        }
        registry
    }

    /// Add a tool. Names are unique; registering a taken name fails.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Definitions advertised to the model, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|tool| tool.definition()).collect()
    }

    /// Run a tool. Never fails: unknown names and tool errors come back as
    /// failed results.
    pub async fn execute(&self, name: &str, input: Value, ctx: &ToolContext) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            return ToolResult::fail(format!("Unknown tool: {name}"));
        };

        debug!(run_id = %ctx.run_id, tool = %name, "Executing tool");
        match tool.execute(input, ctx).await {
            Ok(result) => result,
            Err(e) => {
                ctx.logger.error(format!("Tool \"{name}\" failed: {e}")).await;
                ToolResult::fail(e.to_string())
            }
        }
    }
}
