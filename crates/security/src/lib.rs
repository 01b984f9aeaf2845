//! Security layer for Yips: workspace paths, risk classification, approvals, and audit logging.
//!
//! Provides:
//! - **Path resolution**: Workspace-relative resolution and forbidden-prefix matching
//! - **Risk Gate**: Classifies each tool call as auto, confirm, or deny
//! - **Approval**: Pluggable confirmation for confirm-level calls
//! - **Audit logging**: Structured security event logging

pub mod approval;
pub mod audit;
pub mod path;
pub mod risk;

pub use approval::{Approver, ConfirmationRequest, HeadlessApprover, StaticApprover};
pub use audit::{AuditEntry, AuditEvent, AuditLogger, AuditOutcome, AuditSink, TracingSink};
pub use path::{
    canonical_root, expand_tilde, is_within, matching_forbidden_prefix, resolve_in_workspace,
};
pub use risk::{
    CommandClassifier, DEFAULT_FORBIDDEN_PATHS, DefaultCommandClassifier, RiskAssessment,
    RiskFinding, RiskGate, RiskLevel,
};
