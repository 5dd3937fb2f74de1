//! Claude Code agent executor for Pipewright.
//!
//! [`ClaudeAgentExecutor`] implements the engine's `TaskExecutor` by running
//! the Claude Code CLI as a subprocess: the task directive is rendered into
//! a prompt, the streamed answer is repaired and its JSON object becomes the
//! task's result document.
//!
//! The [`repair`] helpers are also used on their own by the `repair-json`
//! command.

mod error;
mod executor;
mod prompt;
pub mod repair;
mod types;

pub use error::AgentError;
pub use executor::ClaudeAgentExecutor;
pub use prompt::render_prompt;
pub use types::{AssistantMessage, ClaudeMessage, ContentItem, PermissionMode};
