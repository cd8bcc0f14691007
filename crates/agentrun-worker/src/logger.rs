//! Per-run file logs.
//!
//! Each run gets `runs/<id>/logs/` with three channels:
//!
//! - `agent.log`: everything, in order
//! - `tool.log`: tool invocations only
//! - `error.log`: errors only

use std::path::{Path, PathBuf};

use agentrun_core::RunId;
use chrono::{SecondsFormat, Utc};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, warn};

const AGENT: &str = "agent";
const TOOL: &str = "tool";
const ERROR: &str = "error";

/// Append-only, timestamped run log.
///
/// Write failures are reported through `tracing` and never fail the run.
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: RunId,
    logs_dir: PathBuf,
}

impl RunLogger {
    /// Create the log directory under `run_dir`.
    pub async fn create(run_dir: &Path, run_id: RunId) -> std::io::Result<Self> {
        let logs_dir = run_dir.join("logs");
        tokio::fs::create_dir_all(&logs_dir).await?;
        Ok(Self { run_id, logs_dir })
    }

    /// Path of a channel's log file.
    pub fn log_path(&self, channel: &str) -> PathBuf {
        self.logs_dir.join(format!("{channel}.log"))
    }

    pub async fn log(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        debug!(run_id = %self.run_id, "{message}");
        self.append(AGENT, message).await;
    }

    pub async fn error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        error!(run_id = %self.run_id, "{message}");
        self.append(ERROR, message).await;
        self.append(AGENT, &format!("[ERROR] {message}")).await;
    }

    pub async fn tool(&self, tool_name: &str, message: impl AsRef<str>) {
        let message = message.as_ref();
        debug!(run_id = %self.run_id, tool = %tool_name, "{message}");
        self.append(TOOL, &format!("[{tool_name}] {message}")).await;
        self.append(AGENT, &format!("[TOOL:{tool_name}] {message}")).await;
    }

    async fn append(&self, channel: &str, message: &str) {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let line = format!("[{timestamp}] {message}\n");
        let path = self.log_path(channel);

        let result = async {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            file.write_all(line.as_bytes()).await
        }
        .await;

        if let Err(e) = result {
            warn!(run_id = %self.run_id, path = %path.display(), error = %e, "Failed to write run log");
        }
    }
}
