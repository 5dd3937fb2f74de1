//! Status enums for runs and effects.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a pipeline run.
///
/// `NotStarted -> Running -> AwaitingApproval -> Completed | Rejected`,
/// and `Running -> Failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// Run has not been invoked yet.
    #[default]
    NotStarted,
    /// Tasks are being dispatched.
    Running,
    /// All tasks succeeded; waiting for a breakpoint decision.
    AwaitingApproval,
    /// Breakpoint approved.
    Completed,
    /// Breakpoint declined. Task work remains valid and persisted.
    Rejected,
    /// A task halted the run.
    Failed,
}

impl RunState {
    /// Returns true if the run is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Failed)
    }

    /// Returns true if every task of the run has succeeded.
    pub fn tasks_succeeded(&self) -> bool {
        matches!(
            self,
            Self::AwaitingApproval | Self::Completed | Self::Rejected
        )
    }

    /// Check whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (NotStarted, Running)
                | (Failed, Running)
                | (AwaitingApproval, Running)
                | (Running, Running)
                | (Running, AwaitingApproval)
                | (Running, Failed)
                | (AwaitingApproval, Completed)
                | (AwaitingApproval, Rejected)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Status of one recorded effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectStatus {
    /// Reserved by a dispatcher; no terminal outcome yet.
    Pending,
    /// Output validated and persisted.
    Completed,
    /// Dispatch or validation failed.
    Failed,
}

impl fmt::Display for EffectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Rejected.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::AwaitingApproval.is_terminal());
    }

    #[test]
    fn test_approval_requires_awaiting_state() {
        assert!(RunState::AwaitingApproval.can_transition_to(RunState::Completed));
        assert!(!RunState::Running.can_transition_to(RunState::Completed));
        assert!(!RunState::Rejected.can_transition_to(RunState::Running));
        assert!(!RunState::Completed.can_transition_to(RunState::Running));
    }

    #[test]
    fn test_rejected_still_reports_task_success() {
        assert!(RunState::Rejected.tasks_succeeded());
        assert!(!RunState::Failed.tasks_succeeded());
    }
}
