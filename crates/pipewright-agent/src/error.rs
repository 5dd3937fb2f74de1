//! Error types for the agent executor.

use pipewright_engine::ExecutorError;
use thiserror::Error;

/// Errors that can occur while running a task through Claude Code.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Claude CLI executable not found.
    #[error("Claude CLI not found at '{0}'. Ensure Claude Code is installed.")]
    ClaudeNotFound(String),

    /// Failed to spawn the Claude process.
    #[error("Failed to spawn Claude process: {0}")]
    SpawnError(#[from] std::io::Error),

    /// Claude process exited with an error.
    #[error("Claude process exited with error: {0}")]
    ProcessError(String),

    /// Claude reported an error result.
    #[error("Claude reported an error: {0}")]
    ResultError(String),

    /// The stream ended without a result or any assistant text.
    #[error("Claude produced no result")]
    NoResult,

    /// The final answer did not contain a JSON object.
    #[error("no JSON object found in Claude's answer: {0}")]
    NoJsonObject(String),
}

impl From<AgentError> for ExecutorError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::ClaudeNotFound(_) | AgentError::SpawnError(_) => ExecutorError::Unavailable(e.to_string()),
            AgentError::ProcessError(_) | AgentError::ResultError(_) => ExecutorError::Failed(e.to_string()),
            AgentError::NoResult | AgentError::NoJsonObject(_) => ExecutorError::InvalidOutput(e.to_string()),
        }
    }
}
