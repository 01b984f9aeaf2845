//! Session wiring: config in, conductor out.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use yips_agent::{TurnConductor, protocol_prompt};
use yips_config::{AppConfig, ApprovalMode};
use yips_core::backend::AssistantBackend;
use yips_core::message::Message;
use yips_core::tool::ToolName;
use yips_providers::{ChunkSink, OpenAiCompatBackend};
use yips_security::{
    Approver, AuditLogger, HeadlessApprover, RiskGate, StaticApprover, TracingSink,
};
use yips_tools::staged::DEFAULT_TTL_SECS;
use yips_tools::{StagedChangeStore, WorkspaceToolExecutor};

use crate::terminal::StdinApprover;

/// Everything one session needs. Each session gets its own staged store.
pub struct Session {
    pub conductor: TurnConductor,
    pub backend: Arc<dyn AssistantBackend>,
    pub root: PathBuf,
}

impl Session {
    pub fn build(
        config: &AppConfig,
        approver: Arc<dyn Approver>,
        sink: Option<Arc<dyn ChunkSink>>,
    ) -> yips_core::Result<Self> {
        let root = config.workspace.resolve_root();
        if !root.is_dir() {
            return Err(yips_core::Error::Config {
                message: format!("Workspace root {} is not a directory", root.display()),
            });
        }

        let mut backend = OpenAiCompatBackend::from_config(&config.backend)?
            .with_project_context(load_project_context(&root, &config.workspace.project_context_file));
        if let Some(sink) = sink.filter(|_| config.backend.stream) {
            backend = backend.with_chunk_sink(sink);
        }
        let backend: Arc<dyn AssistantBackend> = Arc::new(backend);

        let ttl = i64::try_from(config.workspace.staged_change_ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or_else(|| chrono::Duration::seconds(DEFAULT_TTL_SECS));
        let tools = WorkspaceToolExecutor::new(&root)
            .with_staged_store(Arc::new(StagedChangeStore::new(ttl)))
            .with_command_timeout(Duration::from_secs(config.workspace.command_timeout_secs));

        let risk_gate = RiskGate::new(&root).with_forbidden_paths(config.workspace.forbidden_paths.clone());
        let audit = Arc::new(AuditLogger::with_sinks(vec![Box::new(TracingSink)]));

        let conductor = TurnConductor::new(backend.clone(), Arc::new(tools), risk_gate, approver)
            .with_config(config.agent.turn_config())
            .with_subagents(config.agent.enable_subagents)
            .with_audit(audit);

        Ok(Self {
            conductor,
            backend,
            root,
        })
    }

    /// A fresh history opening with the protocol prompt.
    pub fn new_history(&self) -> Vec<Message> {
        vec![Message::system(protocol_prompt(
            &ToolName::ALL,
            self.conductor.subagents_enabled(),
        ))]
    }
}

/// The approver for an interactive session.
pub fn interactive_approver(mode: ApprovalMode) -> Arc<dyn Approver> {
    match mode {
        ApprovalMode::Prompt => Arc::new(StdinApprover),
        ApprovalMode::Deny => Arc::new(HeadlessApprover),
        ApprovalMode::Allow => Arc::new(StaticApprover(true)),
    }
}

/// The approver for a single unattended turn. Nobody is there to answer.
pub fn headless_approver(mode: ApprovalMode, yes: bool) -> Arc<dyn Approver> {
    if yes || mode == ApprovalMode::Allow {
        Arc::new(StaticApprover(true))
    } else {
        Arc::new(HeadlessApprover)
    }
}

/// Read the project context file under `root`, if there is one.
pub fn load_project_context(root: &Path, file: &str) -> Option<String> {
    if file.trim().is_empty() {
        return None;
    }
    let path = root.join(file);
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            debug!(path = %path.display(), bytes = text.len(), "Loaded project context");
            Some(text)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read project context");
            None
        }
    }
}
