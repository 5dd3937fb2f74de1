//! Run errors.

use pipewright_core::{CoreError, DefinitionError, HaltKind, ValidationError};
use thiserror::Error;

use crate::executor::ExecutorError;
use crate::gate::GateError;
use crate::store::StoreError;

/// Why a run stopped. Every task-level variant names the task that halted
/// the run so a re-invocation can be diagnosed.
#[derive(Debug, Error)]
pub enum RunError {
    /// Pipeline inputs were rejected before any task ran.
    #[error("invalid inputs for '{}': {}", .0.task, .0.message)]
    Inputs(DefinitionError),

    /// A task builder produced a structurally invalid spec.
    #[error("task '{task}' has an invalid definition: {message}")]
    Definition { task: String, message: String },

    /// The executor failed, timed out or was unreachable.
    #[error("task '{task}' dispatch failed: {source}")]
    Dispatch {
        task: String,
        #[source]
        source: ExecutorError,
    },

    /// The executor's output did not match the declared schema.
    #[error("task '{task}' output failed validation: {source}")]
    Validation {
        task: String,
        #[source]
        source: ValidationError,
    },

    /// The effect store failed or refused the reservation.
    #[error("task '{task}' store error: {source}")]
    Store {
        task: String,
        #[source]
        source: StoreError,
    },

    /// Cancellation was requested before or during this task.
    #[error("run cancelled at task '{task}'")]
    Cancelled { task: String },

    /// Run records could not be read or written.
    #[error("run store error: {0}")]
    RunStore(#[source] StoreError),

    #[error("approval gate error: {0}")]
    Gate(#[from] GateError),

    #[error("run '{0}' not found")]
    RunNotFound(String),

    #[error("run '{run_id}' belongs to process '{recorded}', not '{requested}'")]
    ProcessMismatch {
        run_id: String,
        recorded: String,
        requested: String,
    },

    #[error("run '{0}' was started with different inputs")]
    InputsMismatch(String),

    #[error(transparent)]
    State(#[from] CoreError),
}

impl RunError {
    /// The task that halted the run, if the error is task-level.
    pub fn task(&self) -> Option<&str> {
        match self {
            Self::Definition { task, .. }
            | Self::Dispatch { task, .. }
            | Self::Validation { task, .. }
            | Self::Store { task, .. }
            | Self::Cancelled { task } => Some(task),
            _ => None,
        }
    }

    /// Halt category for task-level errors.
    pub fn halt_kind(&self) -> Option<HaltKind> {
        match self {
            Self::Definition { .. } => Some(HaltKind::Definition),
            Self::Dispatch { .. } => Some(HaltKind::Dispatch),
            Self::Validation { .. } => Some(HaltKind::Validation),
            Self::Store { .. } => Some(HaltKind::Store),
            Self::Cancelled { .. } => Some(HaltKind::Cancelled),
            _ => None,
        }
    }

    /// Field diagnostics when a task's output failed validation.
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<DefinitionError> for RunError {
    fn from(e: DefinitionError) -> Self {
        Self::Definition {
            task: e.task,
            message: e.message,
        }
    }
}
