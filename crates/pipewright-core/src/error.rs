//! Core domain errors.

use thiserror::Error;

/// Core domain errors for Pipewright.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Run id is not usable as a path component.
    #[error("Invalid run id '{0}': expected 1-128 characters of [A-Za-z0-9._-]")]
    InvalidRunId(String),

    /// Invalid state transition.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A task builder produced a structurally invalid spec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid task definition '{task}': {message}")]
pub struct DefinitionError {
    /// Name of the offending task (or the process, for input errors).
    pub task: String,
    /// What was wrong.
    pub message: String,
}

impl DefinitionError {
    pub fn new(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            message: message.into(),
        }
    }
}
