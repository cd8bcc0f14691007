//! AgentRun worker.
//!
//! A worker claims task runs from the shared work queue through a consumer
//! group, drives the agent tool-calling loop for each one inside a per-run
//! workspace, and records the outcome on both the run record and the run's
//! event stream.
//!
//! ```text
//! WorkerPool ── Worker (consumer loop) ── TaskExecutor ── AgentLoop
//!                                                          ├── ModelClient
//!                                                          └── ToolRegistry
//! ```

pub mod agent;
pub mod cancel;
pub mod config;
pub mod consumer;
pub mod context;
pub mod error;
pub mod executor;
pub mod human;
pub mod logger;
pub mod pool;
pub mod tools;

pub use agent::AgentLoop;
pub use cancel::CancellationRegistry;
pub use config::{AgentConfig, WorkerConfig, DEFAULT_SYSTEM_PROMPT};
pub use consumer::Worker;
pub use context::{ExecutionContext, ExecutionResult, RunOutcome};
pub use error::{LoopError, WorkerError};
pub use executor::TaskExecutor;
pub use logger::RunLogger;
pub use pool::WorkerPool;
pub use tools::{Tool, ToolContext, ToolError, ToolRegistry, ToolResult};
