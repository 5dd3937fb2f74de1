//! Approval gates for the end-of-run breakpoint.
//!
//! Gates control how the breakpoint is answered:
//! - [`AutoApprove`]: decide immediately
//! - [`DeferredGate`]: persist the request and return; a later
//!   [`ProcessRunner::resolve`](crate::ProcessRunner::resolve) call records
//!   the decision

use async_trait::async_trait;
use pipewright_core::{ApprovalMethod, BreakpointDecision, BreakpointRequest};
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised while asking for approval.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("approval channel io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("approval channel closed")]
    ChannelClosed,
}

/// Result of asking a gate.
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    /// A decision was made now.
    Decided(BreakpointDecision),
    /// No decision yet; the run stays in `AwaitingApproval`.
    Deferred,
}

/// Something that can answer a breakpoint.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn request_approval(&self, request: &BreakpointRequest) -> Result<GateOutcome, GateError>;
}

/// Approves every breakpoint.
#[derive(Debug, Clone, Default)]
pub struct AutoApprove {
    notes: Option<String>,
}

impl AutoApprove {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to attach notes to every decision.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

#[async_trait]
impl ApprovalGate for AutoApprove {
    async fn request_approval(&self, request: &BreakpointRequest) -> Result<GateOutcome, GateError> {
        debug!(title = %request.title, "Gate is auto, approving immediately");
        Ok(GateOutcome::Decided(BreakpointDecision::approve(
            request,
            ApprovalMethod::Auto,
            self.notes.clone(),
        )))
    }
}

/// Never decides; leaves the run waiting for an external decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeferredGate;

#[async_trait]
impl ApprovalGate for DeferredGate {
    async fn request_approval(&self, request: &BreakpointRequest) -> Result<GateOutcome, GateError> {
        info!(title = %request.title, question = %request.question, "Breakpoint awaiting external decision");
        Ok(GateOutcome::Deferred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> BreakpointRequest {
        BreakpointRequest {
            question: "Approve?".to_string(),
            title: "Review".to_string(),
            context: json!({}),
        }
    }

    #[tokio::test]
    async fn test_auto_approve() {
        let gate = AutoApprove::new().with_notes("ci");
        match gate.request_approval(&request()).await.unwrap() {
            GateOutcome::Decided(decision) => {
                assert!(decision.approved);
                assert_eq!(decision.method, ApprovalMethod::Auto);
                assert_eq!(decision.notes.as_deref(), Some("ci"));
            }
            GateOutcome::Deferred => panic!("auto gate deferred"),
        }
    }

    #[tokio::test]
    async fn test_deferred_gate() {
        let outcome = DeferredGate.request_approval(&request()).await.unwrap();
        assert_eq!(outcome, GateOutcome::Deferred);
    }
}
