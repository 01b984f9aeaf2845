//! Approval of confirm-level tool calls.
//!
//! The agent loop asks an [`Approver`] whenever the Risk Gate returns
//! `confirm`. Hosts without a human at the keyboard use
//! [`HeadlessApprover`], which refuses everything.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use yips_core::tool::{ToolCall, ToolName, ToolRequest};

use crate::risk::RiskAssessment;

/// What the approver is asked to decide on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub call_id: String,
    pub tool: ToolName,
    /// One-line description of what the call would do
    pub summary: String,
    /// Risk reason tags
    pub reasons: Vec<String>,
    /// Subagent depth the call originates from
    pub depth: u32,
}

impl ConfirmationRequest {
    pub fn for_call(call: &ToolCall, assessment: &RiskAssessment, depth: u32) -> Self {
        Self {
            call_id: call.id.clone(),
            tool: call.name(),
            summary: summarize(&call.request),
            reasons: assessment.reasons.clone(),
            depth,
        }
    }
}

fn summarize(request: &ToolRequest) -> String {
    match request {
        ToolRequest::RunCommand(args) => match &args.cwd {
            Some(cwd) => format!("{} (in {cwd})", args.command),
            None => args.command.clone(),
        },
        ToolRequest::ApplyFileChange(args) => format!("token {}", args.token),
        other => other.target_path().unwrap_or_default().to_string(),
    }
}

/// Decides whether a confirm-level call may run.
#[async_trait]
pub trait Approver: Send + Sync {
    async fn approve(&self, request: &ConfirmationRequest) -> bool;
}

/// Refuses every request. For unattended runs and bot transports.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessApprover;

#[async_trait]
impl Approver for HeadlessApprover {
    async fn approve(&self, request: &ConfirmationRequest) -> bool {
        tracing::debug!(tool = %request.tool, "Headless session, refusing confirmation");
        false
    }
}

/// Gives the same answer to every request.
#[derive(Debug, Clone, Copy)]
pub struct StaticApprover(pub bool);

#[async_trait]
impl Approver for StaticApprover {
    async fn approve(&self, _request: &ConfirmationRequest) -> bool {
        self.0
    }
}
