//! Run records and pipeline results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::artifact::Artifact;
use crate::breakpoint::{BreakpointDecision, BreakpointRequest};
use crate::error::CoreError;
use crate::ids::RunId;
use crate::status::RunState;

/// Identifying metadata of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    /// Name of the pipeline that ran.
    pub pipeline_id: String,
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
}

/// Final result of a run that got through every task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    /// True when every task succeeded, even if the breakpoint was rejected.
    pub success: bool,

    /// `AwaitingApproval`, `Completed` or `Rejected`.
    pub state: RunState,

    pub per_component_summaries: BTreeMap<String, Value>,
    pub artifacts: Vec<Artifact>,
    pub duration_ms: u64,
    pub metadata: RunMetadata,
    pub breakpoint: BreakpointRequest,
    pub decision: Option<BreakpointDecision>,
}

impl PipelineResult {
    pub fn is_approved(&self) -> bool {
        self.state == RunState::Completed
    }

    pub fn is_rejected(&self) -> bool {
        self.state == RunState::Rejected
    }

    pub fn is_awaiting_approval(&self) -> bool {
        self.state == RunState::AwaitingApproval
    }
}

/// Category of the failure that halted a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltKind {
    Definition,
    Dispatch,
    Validation,
    Store,
    Cancelled,
}

impl fmt::Display for HaltKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Definition => "definition",
            Self::Dispatch => "dispatch",
            Self::Validation => "validation",
            Self::Store => "store",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Which task halted a run and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaltInfo {
    pub task: String,
    pub kind: HaltKind,
    pub message: String,
}

/// Persisted state of one run.
///
/// Saved after every task and at every state change so a run can be
/// inspected, resumed, or decided on by a later process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_id: RunId,
    pub process: String,
    pub inputs: Value,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// From `started_at` to the breakpoint, across resumes.
    pub duration_ms: u64,

    /// Names of tasks with validated output, in completion order.
    pub completed_tasks: Vec<String>,
    pub artifacts: Vec<Artifact>,
    pub summaries: BTreeMap<String, Value>,
    pub breakpoint: Option<BreakpointRequest>,
    pub decision: Option<BreakpointDecision>,
    pub halted_at: Option<HaltInfo>,
}

impl RunRecord {
    /// A record for a run that has not started.
    pub fn new(run_id: RunId, process: impl Into<String>, inputs: Value, now: DateTime<Utc>) -> Self {
        Self {
            run_id,
            process: process.into(),
            inputs,
            state: RunState::NotStarted,
            started_at: now,
            updated_at: now,
            duration_ms: 0,
            completed_tasks: Vec::new(),
            artifacts: Vec::new(),
            summaries: BTreeMap::new(),
            breakpoint: None,
            decision: None,
            halted_at: None,
        }
    }

    /// Move to `next`, rejecting illegal transitions.
    pub fn transition(&mut self, next: RunState, now: DateTime<Utc>) -> Result<(), CoreError> {
        if !self.state.can_transition_to(next) {
            return Err(CoreError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        self.updated_at = now;
        Ok(())
    }

    /// Build the pipeline result, if the run got through every task.
    pub fn to_result(&self) -> Option<PipelineResult> {
        if !self.state.tasks_succeeded() {
            return None;
        }
        Some(PipelineResult {
            success: true,
            state: self.state,
            per_component_summaries: self.summaries.clone(),
            artifacts: self.artifacts.clone(),
            duration_ms: self.duration_ms,
            metadata: RunMetadata {
                pipeline_id: self.process.clone(),
                run_id: self.run_id.clone(),
                started_at: self.started_at,
            },
            breakpoint: self.breakpoint.clone()?,
            decision: self.decision.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakpoint::ApprovalMethod;
    use serde_json::json;

    fn awaiting() -> RunRecord {
        let now = Utc::now();
        let mut record = RunRecord::new(RunId::generate(), "demo", json!({}), now);
        record.transition(RunState::Running, now).unwrap();
        record.transition(RunState::AwaitingApproval, now).unwrap();
        record.breakpoint = Some(BreakpointRequest {
            question: "ok?".to_string(),
            title: "demo".to_string(),
            context: json!({}),
        });
        record
    }

    #[test]
    fn test_no_result_before_all_tasks_succeed() {
        let now = Utc::now();
        let mut record = RunRecord::new(RunId::generate(), "demo", json!({}), now);
        assert!(record.to_result().is_none());
        record.transition(RunState::Running, now).unwrap();
        record.transition(RunState::Failed, now).unwrap();
        assert!(record.to_result().is_none());
    }

    #[test]
    fn test_awaiting_result_is_successful_but_undecided() {
        let result = awaiting().to_result().unwrap();
        assert!(result.success);
        assert!(result.is_awaiting_approval());
        assert!(result.decision.is_none());
    }

    #[test]
    fn test_rejection_is_distinct_from_failure() {
        let mut record = awaiting();
        let request = record.breakpoint.clone().unwrap();
        record.decision = Some(BreakpointDecision::reject(&request, ApprovalMethod::External, None));
        record.transition(RunState::Rejected, Utc::now()).unwrap();

        let result = record.to_result().unwrap();
        assert!(result.success);
        assert!(result.is_rejected());
        assert!(record.transition(RunState::Running, Utc::now()).is_err());
    }
}
