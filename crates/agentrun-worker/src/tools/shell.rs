//! Shell command tool.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command;

use super::sandbox::resolve_real_path;
use super::{parse_input, Tool, ToolContext, ToolError, ToolResult};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ShellInput {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    cwd: Option<String>,
    /// Milliseconds.
    #[serde(default)]
    timeout: Option<u64>,
}

/// Runs `sh -c` inside the run workspace.
pub struct ShellTool {
    default_timeout: Duration,
}

impl Default for ShellTool {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ShellTool {
    pub fn with_default_timeout(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }
}

/// Single-quote an argument for `sh`.
fn quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

fn command_line(command: &str, args: &[String]) -> String {
    let mut line = command.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&quote(arg));
    }
    line
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command. Use this to run system commands, scripts, or programs."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to execute"
                },
                "args": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Arguments to pass to the command"
                },
                "cwd": {
                    "type": "string",
                    "description": "Working directory, relative to the workspace. Defaults to the workspace root."
                },
                "timeout": {
                    "type": "number",
                    "description": "Timeout in milliseconds. Defaults to 30000 (30 seconds)."
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let input: ShellInput = parse_input(input)?;
        let cwd = match input.cwd.as_deref() {
            Some(dir) => resolve_real_path(&ctx.work_dir, dir).await?,
            None => ctx.work_dir.clone(),
        };
        let timeout = input
            .timeout
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout);
        let line = command_line(&input.command, &input.args);

        ctx.logger.log(format!("Executing: {line}")).await;

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&line)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| ToolError::Timeout(timeout))??;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            return Ok(ToolResult::ok(stdout));
        }

        let error = if !stderr.trim().is_empty() {
            stderr
        } else {
            match output.status.code() {
                Some(code) => format!("Process exited with code {code}"),
                None => "Process terminated by signal".to_string(),
            }
        };
        Ok(ToolResult {
            success: false,
            output: Some(stdout),
            error: Some(error),
        })
    }
}
