//! File tools confined to the run workspace.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::sandbox::resolve_real_path;
use super::{parse_input, Tool, ToolContext, ToolError, ToolResult};

#[derive(Debug, Deserialize)]
struct ReadFileInput {
    path: String,
}

#[derive(Debug, Deserialize)]
struct WriteFileInput {
    path: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ListDirectoryInput {
    #[serde(default = "current_dir")]
    path: String,
}

fn current_dir() -> String {
    ".".to_string()
}

#[derive(Debug, Serialize)]
struct DirEntryInfo {
    name: String,
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Reads a UTF-8 file from the workspace.
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to read (relative to workspace)"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let input: ReadFileInput = parse_input(input)?;
        let path = resolve_real_path(&ctx.work_dir, &input.path).await?;

        ctx.logger.log(format!("Reading file: {}", input.path)).await;
        let content = tokio::fs::read_to_string(&path).await?;
        Ok(ToolResult::ok(content))
    }
}

/// Writes a file in the workspace, creating parent directories.
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file (creates directories if needed)"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to write (relative to workspace)"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let input: WriteFileInput = parse_input(input)?;
        let path = resolve_real_path(&ctx.work_dir, &input.path).await?;

        ctx.logger.log(format!("Writing file: {}", input.path)).await;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, input.content.as_bytes()).await?;
        Ok(ToolResult::ok(format!("File written: {}", input.path)))
    }
}

/// Lists a workspace directory as JSON `[{"name", "type"}]`.
pub struct ListDirectoryTool;

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List contents of a directory"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the directory (relative to workspace, default: .)"
                }
            },
            "required": []
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let input: ListDirectoryInput = parse_input(input)?;
        let path = resolve_real_path(&ctx.work_dir, &input.path).await?;

        ctx.logger.log(format!("Listing directory: {}", input.path)).await;
        let mut dir = tokio::fs::read_dir(&path).await?;
        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let kind = if entry.file_type().await?.is_dir() {
                "directory"
            } else {
                "file"
            };
            entries.push(DirEntryInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let output = serde_json::to_string_pretty(&entries)
            .map_err(|e| ToolError::InvalidInput(e.to_string()))?;
        Ok(ToolResult::ok(output))
    }
}
