//! Language model client for AgentRun.
//!
//! The agent loop talks to the model through one call: send the running
//! conversation, the system prompt and the tool definitions, get back a stop
//! reason, content blocks and token usage.
//!
//! # Example
//!
//! ```rust,no_run
//! use agentrun_llm::{AnthropicClient, MessageParam, MessageRequest, ModelClient};
//!
//! async fn ask() -> Result<(), agentrun_llm::LlmError> {
//!     let client = AnthropicClient::new(std::env::var("ANTHROPIC_API_KEY").unwrap_or_default())?;
//!     let response = client
//!         .create_message(&MessageRequest::new(
//!             "claude-sonnet-4-20250514",
//!             1024,
//!             vec![MessageParam::user_text("What is 2 + 2?")],
//!         ))
//!         .await?;
//!     println!("{}", response.text().unwrap_or_default());
//!     Ok(())
//! }
//! ```

mod anthropic;
mod client;
mod error;
mod types;

pub use anthropic::AnthropicClient;
pub use client::ModelClient;
pub use error::LlmError;
pub use types::{
    ContentBlock, MessageParam, MessageRequest, MessageResponse, Role, StopReason, ToolCall,
    ToolDefinition, Usage,
};
