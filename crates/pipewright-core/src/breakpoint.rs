//! Breakpoint requests and decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request for an external approval decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakpointRequest {
    /// Human-readable question to put to the approver.
    pub question: String,
    pub title: String,
    /// Run summary: pipeline name and key run parameters.
    pub context: Value,
}

/// How a decision was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMethod {
    /// Gate configured to auto-approve.
    Auto,
    /// Answered at a terminal prompt.
    Cli,
    /// Recorded later by an external decision event.
    External,
}

/// The recorded answer to a [`BreakpointRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointDecision {
    pub question: String,
    pub title: String,
    pub context: Value,
    pub approved: bool,
    pub notes: Option<String>,
    pub method: ApprovalMethod,
    pub decided_at: DateTime<Utc>,
}

impl BreakpointDecision {
    /// Approve `request`.
    pub fn approve(request: &BreakpointRequest, method: ApprovalMethod, notes: Option<String>) -> Self {
        Self::decide(request, true, method, notes)
    }

    /// Reject `request`.
    pub fn reject(request: &BreakpointRequest, method: ApprovalMethod, notes: Option<String>) -> Self {
        Self::decide(request, false, method, notes)
    }

    fn decide(
        request: &BreakpointRequest,
        approved: bool,
        method: ApprovalMethod,
        notes: Option<String>,
    ) -> Self {
        Self {
            question: request.question.clone(),
            title: request.title.clone(),
            context: request.context.clone(),
            approved,
            notes,
            method,
            decided_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decision_carries_request() {
        let request = BreakpointRequest {
            question: "Ship it?".to_string(),
            title: "Release review".to_string(),
            context: json!({"pipeline": "cli-binary-distribution"}),
        };
        let decision =
            BreakpointDecision::reject(&request, ApprovalMethod::Cli, Some("needs signing".into()));

        assert!(!decision.approved);
        assert_eq!(decision.question, "Ship it?");
        assert_eq!(decision.context, request.context);
        assert_eq!(decision.notes.as_deref(), Some("needs signing"));
    }
}
