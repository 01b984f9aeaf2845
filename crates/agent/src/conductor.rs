//! The turn conductor: one user turn, many rounds.
//!
//! Each round requests one assistant reply, parses its envelope, records
//! the visible text, and runs the requested actions (tools through the
//! Risk Gate, then skills, then subagents). Results go back into the
//! history as system messages and the next round starts. The turn ends
//! when a reply carries no actions or the round budget runs out.
//!
//! Only [`BackendError`] escapes a turn. Every per-action problem is a
//! result the model gets to see.

use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, info, warn};
use yips_core::action::{SkillCall, SkillExecutor, SkillResult, SubagentCall, SubagentResult};
use yips_core::agent::{TurnConfig, TurnOutcome};
use yips_core::backend::{AssistantBackend, AssistantRequest};
use yips_core::error::BackendError;
use yips_core::estimate::{CharRatioEstimator, TokenEstimator};
use yips_core::event::{TurnEvent, TurnObserver};
use yips_core::message::Message;
use yips_core::tool::{ActionStatus, ToolCall, ToolExecutor, ToolName, ToolRequest, ToolResult};
use yips_security::approval::{Approver, ConfirmationRequest};
use yips_security::audit::{AuditEvent, AuditLogger, AuditOutcome};
use yips_security::risk::RiskGate;

use crate::envelope::parse_envelope;
use crate::subagent::{self, SubagentPlan};
use crate::summary::{skill_results_message, subagent_results_message, tool_results_message};

pub const PIVOT_WARNING: &str = "Consecutive tool failures detected; attempting an alternative approach.";

pub const PIVOT_MESSAGE: &str = "Automatic pivot: your recent tool calls kept failing. \
     Do not repeat them as they were. Read the error output, then try a different tool, \
     different arguments, or a different approach. If the task cannot be done, say so plainly.";

pub const SKILLS_UNAVAILABLE: &str = "Skill execution is unavailable: no skill executor is configured.";

pub const SUBAGENTS_UNAVAILABLE: &str = "Subagent delegation is unavailable: subagents are disabled for this session.";

/// Metadata `reason` for calls outside a subagent's allowed tools.
pub const TOOL_NOT_ALLOWED_REASON: &str = "tool-not-allowed";

pub fn max_rounds_warning(limit: u32) -> String {
    format!("Stopped after reaching the maximum of {limit} rounds without a final answer.")
}

/// What a (possibly nested) turn may do.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnScope {
    /// `None` allows every tool
    pub allowed_tools: Option<Vec<ToolName>>,
    pub max_rounds: u32,
    /// Subagent nesting depth (top level = 0)
    pub depth: u32,
    pub stream: bool,
    pub include_project_context: bool,
}

impl TurnScope {
    /// The scope of a user-facing turn.
    pub fn top_level(config: &TurnConfig) -> Self {
        Self {
            allowed_tools: None,
            max_rounds: config.max_rounds,
            depth: 0,
            stream: true,
            include_project_context: true,
        }
    }

    pub fn allows(&self, tool: ToolName) -> bool {
        self.allowed_tools
            .as_ref()
            .is_none_or(|tools| tools.contains(&tool))
    }
}

/// Drives turns against one backend, one tool executor and one Risk Gate.
pub struct TurnConductor {
    backend: Arc<dyn AssistantBackend>,
    tools: Arc<dyn ToolExecutor>,
    skills: Option<Arc<dyn SkillExecutor>>,
    risk_gate: RiskGate,
    approver: Arc<dyn Approver>,
    estimator: Arc<dyn TokenEstimator>,
    audit: Option<Arc<AuditLogger>>,
    config: TurnConfig,
    subagents: bool,
}

impl TurnConductor {
    /// Create a conductor. Skills and subagents start disabled.
    pub fn new(
        backend: Arc<dyn AssistantBackend>,
        tools: Arc<dyn ToolExecutor>,
        risk_gate: RiskGate,
        approver: Arc<dyn Approver>,
    ) -> Self {
        Self {
            backend,
            tools,
            skills: None,
            risk_gate,
            approver,
            estimator: Arc::new(CharRatioEstimator::default()),
            audit: None,
            config: TurnConfig::default(),
            subagents: false,
        }
    }

    pub fn with_skills(mut self, skills: Arc<dyn SkillExecutor>) -> Self {
        self.skills = Some(skills);
        self
    }

    /// Enable or disable subagent delegation.
    pub fn with_subagents(mut self, enabled: bool) -> Self {
        self.subagents = enabled;
        self
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_config(mut self, config: TurnConfig) -> Self {
        self.config = config;
        self
    }

    /// Record denials, confirmations and executions.
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn config(&self) -> &TurnConfig {
        &self.config
    }

    pub fn subagents_enabled(&self) -> bool {
        self.subagents
    }

    /// Run one user-facing turn over `history`, appending to it.
    pub async fn run_turn(
        &self,
        history: &mut Vec<Message>,
        observer: &dyn TurnObserver,
    ) -> Result<TurnOutcome, BackendError> {
        self.run_scoped(history, observer, TurnScope::top_level(&self.config))
            .await
    }

    /// Run a turn narrowed to `scope`. Subagents recurse through here.
    pub fn run_scoped<'a>(
        &'a self,
        history: &'a mut Vec<Message>,
        observer: &'a dyn TurnObserver,
        scope: TurnScope,
    ) -> BoxFuture<'a, Result<TurnOutcome, BackendError>> {
        Box::pin(async move { self.drive(history, observer, &scope).await })
    }

    async fn drive(
        &self,
        history: &mut Vec<Message>,
        observer: &dyn TurnObserver,
        scope: &TurnScope,
    ) -> Result<TurnOutcome, BackendError> {
        let depth = scope.depth;
        let pivot_threshold = self.config.failure_pivot_threshold.max(1);
        let limit = self.config.summary_output_limit;

        let mut rounds = 0;
        let mut failure_streak = 0;
        let mut finished = false;
        let mut used_tokens_exact = None;
        let mut latest_rate = None;

        info!(depth, max_rounds = scope.max_rounds, backend = self.backend.name(), "Starting turn");

        while rounds < scope.max_rounds {
            rounds += 1;
            debug!(round = rounds, depth, history_len = history.len(), "Requesting assistant reply");

            let reply = self
                .backend
                .request(AssistantRequest {
                    messages: history.clone(),
                    stream: scope.stream,
                    include_project_context: scope.include_project_context,
                })
                .await
                .inspect_err(|e| warn!(round = rounds, depth, error = %e, "Backend request failed"))?;

            if reply.total_tokens.is_some() {
                used_tokens_exact = reply.total_tokens;
            }
            let completion_tokens = reply
                .completion_tokens
                .unwrap_or_else(|| self.estimator.estimate_completion_tokens(&reply.text));
            latest_rate = reply
                .generation_duration_ms
                .and_then(|ms| self.estimator.tokens_per_second(completion_tokens, ms));

            let parsed = parse_envelope(&reply.text);
            debug!(
                round = rounds,
                depth,
                form = ?parsed.form,
                tools = parsed.tool_calls.len(),
                skills = parsed.skill_calls.len(),
                subagents = parsed.subagent_calls.len(),
                "Parsed reply"
            );

            history.push(Message::assistant(parsed.assistant_text.clone()));
            observer.on_event(&TurnEvent::AssistantText {
                text: parsed.assistant_text.clone(),
                rendered: reply.rendered,
                depth,
            });
            for warning in &parsed.warnings {
                emit_warning(observer, depth, warning.clone());
            }

            if !parsed.has_actions() {
                finished = true;
                observer.on_event(&TurnEvent::RoundComplete { round: rounds, depth });
                break;
            }

            let tool_results = self.run_tools(&parsed.tool_calls, scope).await;
            let skill_results = self.run_skills(&parsed.skill_calls, observer, depth).await;
            let subagent_results = self
                .run_subagents(&parsed.subagent_calls, observer, depth)
                .await;

            if !tool_results.is_empty() {
                history.push(Message::system(tool_results_message(&tool_results, limit)));
            }
            if !skill_results.is_empty() {
                history.push(Message::system(skill_results_message(&skill_results, limit)));
            }
            if !subagent_results.is_empty() {
                history.push(Message::system(subagent_results_message(&subagent_results, limit)));
            }

            // Rounds without tool results leave the streak alone
            if !tool_results.is_empty() {
                if tool_results.iter().all(|r| r.status.is_failure()) {
                    failure_streak += 1;
                    if failure_streak >= pivot_threshold {
                        warn!(depth, round = rounds, failure_streak, "Repeated tool failures, injecting pivot");
                        emit_warning(observer, depth, PIVOT_WARNING.to_string());
                        history.push(Message::system(PIVOT_MESSAGE));
                        failure_streak = 0;
                    }
                } else {
                    failure_streak = 0;
                }
            }

            observer.on_event(&TurnEvent::RoundComplete { round: rounds, depth });
        }

        if !finished {
            warn!(depth, rounds, "Turn stopped at the round limit");
            emit_warning(observer, depth, max_rounds_warning(scope.max_rounds));
        }

        let estimated_history_tokens = self.estimator.estimate_history_tokens(history);
        info!(depth, rounds, finished, estimated_history_tokens, "Turn complete");

        Ok(TurnOutcome {
            finished,
            rounds,
            used_tokens_exact,
            latest_output_tokens_per_second: latest_rate,
            estimated_history_tokens,
        })
    }

    async fn run_tools(&self, calls: &[ToolCall], scope: &TurnScope) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.dispatch_tool(call, scope).await);
        }
        results
    }

    /// Scope filter, then Risk Gate, then approval, then the executor.
    async fn dispatch_tool(&self, call: &ToolCall, scope: &TurnScope) -> ToolResult {
        let tool = call.name();
        let actor = actor(scope.depth);

        if !scope.allows(tool) {
            warn!(call_id = %call.id, tool = %tool, depth = scope.depth, "Tool outside subagent scope");
            return ToolResult::denied(call, format!("Tool {tool} is not allowed in this subagent's scope."))
                .with_metadata("reason", TOOL_NOT_ALLOWED_REASON);
        }

        let assessment = self.risk_gate.assess(call);
        let request = ConfirmationRequest::for_call(call, &assessment, scope.depth);
        let reasons = assessment.reasons_joined();

        if assessment.is_denied() {
            warn!(call_id = %call.id, tool = %tool, reasons = %reasons, "Risk gate denied tool call");
            self.record(
                AuditEvent::RiskDenied { tool_name: tool.to_string() },
                &actor,
                &request.summary,
                AuditOutcome::Denied,
                Some(reasons.clone()),
            );
            return ToolResult::denied(call, format!("Blocked by risk policy ({reasons})."))
                .with_metadata("reasons", reasons);
        }

        if assessment.needs_confirmation() {
            let approved = self.approver.approve(&request).await;
            self.record(
                AuditEvent::Confirmation { tool_name: tool.to_string() },
                &actor,
                &request.summary,
                if approved { AuditOutcome::Success } else { AuditOutcome::Denied },
                Some(reasons.clone()),
            );
            if !approved {
                warn!(call_id = %call.id, tool = %tool, reasons = %reasons, "Tool call not approved");
                return ToolResult::denied(call, format!("Not approved ({reasons})."))
                    .with_metadata("reasons", reasons);
            }
        }

        let result = self.tools.execute_one(call).await;
        debug!(call_id = %call.id, tool = %tool, status = %result.status, "Tool call finished");

        let event = match &call.request {
            ToolRequest::ApplyFileChange(args) => AuditEvent::StagedApply {
                token: args.token.clone(),
            },
            _ => AuditEvent::ToolExecution { tool_name: tool.to_string() },
        };
        self.record(
            event,
            &actor,
            &request.summary,
            if result.status == ActionStatus::Ok {
                AuditOutcome::Success
            } else {
                AuditOutcome::Failure
            },
            result.metadata.get("reason").cloned(),
        );
        result
    }

    async fn run_skills(&self, calls: &[SkillCall], observer: &dyn TurnObserver, depth: u32) -> Vec<SkillResult> {
        if calls.is_empty() {
            return Vec::new();
        }
        let Some(skills) = &self.skills else {
            warn!(count = calls.len(), depth, "Skill calls without a skill executor");
            emit_warning(
                observer,
                depth,
                format!("Skill execution is unavailable; {} skill call(s) returned errors.", calls.len()),
            );
            return calls
                .iter()
                .map(|call| SkillResult::new(call, ActionStatus::Error, SKILLS_UNAVAILABLE))
                .collect();
        };
        skills.execute(calls).await
    }

    async fn run_subagents(
        &self,
        calls: &[SubagentCall],
        observer: &dyn TurnObserver,
        depth: u32,
    ) -> Vec<SubagentResult> {
        if calls.is_empty() {
            return Vec::new();
        }
        if !self.subagents {
            warn!(count = calls.len(), depth, "Subagent calls while delegation is disabled");
            emit_warning(
                observer,
                depth,
                format!("Subagent delegation is unavailable; {} subagent call(s) returned errors.", calls.len()),
            );
            return calls
                .iter()
                .map(|call| SubagentResult::new(call, ActionStatus::Error, SUBAGENTS_UNAVAILABLE))
                .collect();
        }

        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let result = match subagent::plan(call, depth, &self.config) {
                Ok(SubagentPlan { scope, mut history }) => {
                    let outcome = self.run_scoped(&mut history, observer, scope).await;
                    subagent::finish(call, outcome, &history)
                }
                Err(result) => result,
            };
            debug!(call_id = %call.id, status = %result.status, rounds = result.rounds, "Subagent settled");
            results.push(result);
        }
        results
    }

    fn record(&self, event: AuditEvent, actor: &str, target: &str, outcome: AuditOutcome, details: Option<String>) {
        if let Some(audit) = &self.audit {
            audit.log(event, actor, target, outcome, details);
        }
    }
}

fn emit_warning(observer: &dyn TurnObserver, depth: u32, message: String) {
    observer.on_event(&TurnEvent::Warning { message, depth });
}

fn actor(depth: u32) -> String {
    match depth {
        0 => "agent".to_string(),
        d => format!("subagent:{d}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use serde_json::json;
    use yips_core::backend::AssistantReply;
    use yips_core::event::{NoopObserver, RecordingObserver};
    use yips_core::message::{Role, last_assistant_text};
    use yips_security::approval::HeadlessApprover;
    use yips_tools::WorkspaceToolExecutor;

    struct Harness {
        dir: tempfile::TempDir,
        backend: Arc<ScriptedBackend>,
    }

    impl Harness {
        fn new(replies: Vec<Result<AssistantReply, BackendError>>) -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                backend: Arc::new(ScriptedBackend::new(replies)),
            }
        }

        fn texts(texts: &[&str]) -> Self {
            Self::new(texts.iter().map(|t| Ok(AssistantReply::text(*t))).collect())
        }

        fn conductor(&self) -> TurnConductor {
            TurnConductor::new(
                self.backend.clone(),
                Arc::new(WorkspaceToolExecutor::new(self.dir.path())),
                RiskGate::new(self.dir.path()),
                Arc::new(HeadlessApprover),
            )
        }
    }

    fn user_history(text: &str) -> Vec<Message> {
        vec![Message::system("protocol"), Message::user(text)]
    }

    fn system_messages_starting_with<'a>(history: &'a [Message], prefix: &str) -> Vec<&'a Message> {
        history
            .iter()
            .filter(|m| m.role == Role::System && m.content.starts_with(prefix))
            .collect()
    }

    #[tokio::test]
    async fn plain_reply_finishes_in_one_round() {
        let h = Harness::texts(&["Hello there."]);
        let observer = RecordingObserver::new();
        let mut history = user_history("hi");

        let outcome = h.conductor().run_turn(&mut history, &observer).await.unwrap();

        assert!(outcome.finished);
        assert_eq!(outcome.rounds, 1);
        assert_eq!(last_assistant_text(&history), Some("Hello there."));
        assert_eq!(observer.assistant_texts(), vec!["Hello there."]);
        assert!(observer.warnings().is_empty());
    }

    #[tokio::test]
    async fn tool_round_then_answer() {
        let h = Harness::texts(&[&tool_reply("1", "list_dir", json!({})), "The directory is empty."]);
        std::fs::write(h.dir.path().join("notes.txt"), "x").unwrap();
        let observer = RecordingObserver::new();
        let mut history = user_history("what is here?");

        let outcome = h.conductor().run_turn(&mut history, &observer).await.unwrap();

        assert!(outcome.finished);
        assert_eq!(outcome.rounds, 2);
        assert_eq!(system_messages_starting_with(&history, "Tool results:").len(), 1);

        // The second request sees the results as its last message
        let requests = h.backend.requests();
        assert_eq!(requests.len(), 2);
        let last = requests[1].messages.last().unwrap();
        assert!(last.content.starts_with("Tool results:"));
        assert!(last.content.contains(r#""status":"ok""#));
        assert!(last.content.contains("notes.txt"));
    }

    #[tokio::test]
    async fn every_round_shows_text_exactly_once() {
        let h = Harness::texts(&[&tool_reply("1", "list_dir", json!({})), "Done."]);
        let observer = RecordingObserver::new();
        let mut history = user_history("go");

        h.conductor().run_turn(&mut history, &observer).await.unwrap();

        // Fenced-only reply shows as empty text
        assert_eq!(observer.assistant_texts(), vec!["", "Done."]);
        let assistant_messages = history.iter().filter(|m| m.role == Role::Assistant).count();
        assert_eq!(assistant_messages, 2);
        let completes: Vec<_> = observer
            .events()
            .into_iter()
            .filter(|e| matches!(e, TurnEvent::RoundComplete { .. }))
            .collect();
        assert_eq!(completes.len(), 2);
    }

    #[tokio::test]
    async fn denial_does_not_pivot_or_block_completion() {
        let h = Harness::texts(&[
            &tool_reply("1", "read_file", json!({"path": "/definitely/outside/notes.txt"})),
            "I could not read that file.",
        ]);
        let observer = RecordingObserver::new();
        let mut history = user_history("read it");

        let outcome = h.conductor().run_turn(&mut history, &observer).await.unwrap();

        assert!(outcome.finished);
        assert_eq!(outcome.rounds, 2);
        let results = system_messages_starting_with(&history, "Tool results:");
        assert!(results[0].content.contains(r#""status":"denied""#));
        assert!(results[0].content.contains("outside-workspace"));
        assert!(observer.warnings().is_empty());
        assert!(system_messages_starting_with(&history, "Automatic pivot:").is_empty());
    }

    #[tokio::test]
    async fn approved_confirmation_runs_the_tool() {
        let h = Harness::texts(&[
            &tool_reply("1", "run_command", json!({"command": "echo hi", "cwd": "/"})),
            "Ran it.",
        ]);
        let approver = Arc::new(CountingApprover::new(true));
        let conductor = TurnConductor::new(
            h.backend.clone(),
            Arc::new(StatusTools(ActionStatus::Ok)),
            RiskGate::new(h.dir.path()),
            approver.clone(),
        );
        let mut history = user_history("run");

        conductor.run_turn(&mut history, &RecordingObserver::new()).await.unwrap();

        assert_eq!(approver.asked(), 1);
        let results = system_messages_starting_with(&history, "Tool results:");
        assert!(results[0].content.contains(r#""status":"ok""#));
    }

    #[tokio::test]
    async fn deny_level_skips_the_approver() {
        let h = Harness::texts(&[
            &tool_reply("1", "write_file", json!({"path": "/etc/passwd", "content": "x"})),
            "Refused.",
        ]);
        let approver = Arc::new(CountingApprover::new(true));
        let audit = Arc::new(AuditLogger::new());
        let conductor = TurnConductor::new(
            h.backend.clone(),
            Arc::new(StatusTools(ActionStatus::Ok)),
            RiskGate::new(h.dir.path()),
            approver.clone(),
        )
        .with_audit(audit.clone());
        let mut history = user_history("overwrite passwd");

        conductor.run_turn(&mut history, &RecordingObserver::new()).await.unwrap();

        assert_eq!(approver.asked(), 0);
        let results = system_messages_starting_with(&history, "Tool results:");
        assert!(results[0].content.contains(r#""status":"denied""#));
        assert!(results[0].content.contains("forbidden-path"));
        assert_eq!(audit.entries_by_outcome(&AuditOutcome::Denied).len(), 1);
    }

    #[tokio::test]
    async fn round_limit_stops_the_turn() {
        let call = tool_reply("1", "list_dir", json!({}));
        let h = Harness::texts(&[&call, &call, &call]);
        let observer = RecordingObserver::new();
        let mut history = user_history("loop forever");

        let outcome = h
            .conductor()
            .with_config(TurnConfig {
                max_rounds: 2,
                ..TurnConfig::default()
            })
            .run_turn(&mut history, &observer)
            .await
            .unwrap();

        assert!(!outcome.finished);
        assert_eq!(outcome.rounds, 2);
        assert_eq!(h.backend.call_count(), 2);
        assert_eq!(
            observer.warnings(),
            vec!["Stopped after reaching the maximum of 2 rounds without a final answer."]
        );
    }

    #[tokio::test]
    async fn consecutive_failures_pivot_once() {
        let failing = tool_reply("1", "read_file", json!({"path": "missing.txt"}));
        let h = Harness::texts(&[&failing, &failing, "Giving up on that file."]);
        let observer = RecordingObserver::new();
        let mut history = user_history("read missing.txt");

        let outcome = h.conductor().run_turn(&mut history, &observer).await.unwrap();

        assert!(outcome.finished);
        assert_eq!(outcome.rounds, 3);
        assert_eq!(observer.warnings(), vec![PIVOT_WARNING]);
        assert_eq!(system_messages_starting_with(&history, "Automatic pivot:").len(), 1);

        // The pivot follows the second round's results
        let pivot_at = history
            .iter()
            .position(|m| m.content.starts_with("Automatic pivot:"))
            .unwrap();
        assert!(history[pivot_at - 1].content.starts_with("Tool results:"));
    }

    #[tokio::test]
    async fn timeouts_count_toward_the_pivot() {
        let call = tool_reply("1", "run_command", json!({"command": "sleep 100"}));
        let h = Harness::texts(&[&call, &call, "Stopped."]);
        let conductor = TurnConductor::new(
            h.backend.clone(),
            Arc::new(StatusTools(ActionStatus::Timeout)),
            RiskGate::new(h.dir.path()),
            Arc::new(HeadlessApprover),
        );
        let observer = RecordingObserver::new();
        let mut history = user_history("wait");

        conductor.run_turn(&mut history, &observer).await.unwrap();

        assert_eq!(observer.warnings(), vec![PIVOT_WARNING]);
    }

    #[tokio::test]
    async fn success_between_failures_resets_the_streak() {
        let failing = tool_reply("1", "read_file", json!({"path": "missing.txt"}));
        let working = tool_reply("2", "list_dir", json!({}));
        let h = Harness::texts(&[&failing, &working, &failing, "Done."]);
        let observer = RecordingObserver::new();
        let mut history = user_history("poke around");

        let outcome = h.conductor().run_turn(&mut history, &observer).await.unwrap();

        assert_eq!(outcome.rounds, 4);
        assert!(observer.warnings().is_empty());
    }

    #[tokio::test]
    async fn preview_stages_without_writing() {
        let h = Harness::texts(&[
            &fenced(
                &json!({"tool_calls": [
                    {"id": "p", "name": "preview_write_file", "arguments": {"path": "a.txt", "content": "new\n"}}
                ]})
                .to_string(),
            ),
            "Staged the change.",
        ]);
        let executor = Arc::new(WorkspaceToolExecutor::new(h.dir.path()));
        let conductor = TurnConductor::new(
            h.backend.clone(),
            executor.clone(),
            RiskGate::new(h.dir.path()),
            Arc::new(HeadlessApprover),
        );
        let mut history = user_history("stage a.txt");
        conductor.run_turn(&mut history, &RecordingObserver::new()).await.unwrap();

        let results = system_messages_starting_with(&history, "Tool results:");
        assert!(results[0].content.contains("+new"));
        assert!(!h.dir.path().join("a.txt").exists());
        assert_eq!(executor.staged_store().len(), 1);
    }

    #[tokio::test]
    async fn envelope_warnings_are_forwarded() {
        let h = Harness::texts(&[&fenced(r#"{"assistant_text":"Careful.","warnings":["large diff"]}"#)]);
        let observer = RecordingObserver::new();
        let mut history = user_history("go");

        let outcome = h.conductor().run_turn(&mut history, &observer).await.unwrap();

        assert!(outcome.finished);
        assert_eq!(observer.warnings(), vec!["large diff"]);
        assert_eq!(last_assistant_text(&history), Some("Careful."));
    }

    #[tokio::test]
    async fn top_level_requests_stream_with_project_context() {
        let h = Harness::texts(&["ok"]);
        let mut history = user_history("hi");
        h.conductor().run_turn(&mut history, &NoopObserver).await.unwrap();

        let request = &h.backend.requests()[0];
        assert!(request.stream);
        assert!(request.include_project_context);
    }

    #[tokio::test]
    async fn backend_errors_escape_the_turn() {
        let h = Harness::new(vec![Err(BackendError::Unavailable("connection refused".into()))]);
        let mut history = user_history("hi");

        let err = h
            .conductor()
            .run_turn(&mut history, &RecordingObserver::new())
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::Unavailable(_)));
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn usage_figures_reach_the_outcome() {
        let h = Harness::new(vec![Ok(AssistantReply {
            text: "Answer.".into(),
            rendered: true,
            total_tokens: Some(120),
            completion_tokens: Some(40),
            generation_duration_ms: Some(2000),
        })]);
        let observer = RecordingObserver::new();
        let mut history = user_history("hi");

        let outcome = h.conductor().run_turn(&mut history, &observer).await.unwrap();

        assert_eq!(outcome.used_tokens_exact, Some(120));
        assert_eq!(outcome.latest_output_tokens_per_second, Some(20.0));
        assert!(outcome.estimated_history_tokens > 0);
        assert!(matches!(
            observer.events()[0],
            TurnEvent::AssistantText { rendered: true, .. }
        ));
    }

    #[tokio::test]
    async fn missing_skill_executor_yields_errors() {
        let h = Harness::texts(&[
            &fenced(r#"{"skill_calls":[{"id":"k1","name":"weather","arguments":{}}]}"#),
            "No weather for you.",
        ]);
        let observer = RecordingObserver::new();
        let mut history = user_history("weather?");

        let outcome = h.conductor().run_turn(&mut history, &observer).await.unwrap();

        assert!(outcome.finished);
        let warnings = observer.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Skill execution is unavailable"));
        let results = system_messages_starting_with(&history, "Skill results:");
        assert!(results[0].content.contains(r#""status":"error""#));
        assert!(results[0].content.contains(SKILLS_UNAVAILABLE));
    }

    #[tokio::test]
    async fn skills_run_when_configured() {
        let h = Harness::texts(&[
            &fenced(r#"{"skill_calls":[{"id":"k1","name":"weather"}]}"#),
            "Sunny.",
        ]);
        let mut history = user_history("weather?");

        h.conductor()
            .with_skills(Arc::new(EchoSkills))
            .run_turn(&mut history, &RecordingObserver::new())
            .await
            .unwrap();

        let results = system_messages_starting_with(&history, "Skill results:");
        assert!(results[0].content.contains(r#""skill":"weather","status":"ok","output":"ran weather""#));
    }

    #[tokio::test]
    async fn disabled_subagents_yield_errors() {
        let h = Harness::texts(&[
            &fenced(r#"{"subagent_calls":[{"id":"s1","task":"Look around"}]}"#),
            "Fine, I will do it myself.",
        ]);
        let observer = RecordingObserver::new();
        let mut history = user_history("delegate");

        let outcome = h.conductor().run_turn(&mut history, &observer).await.unwrap();

        assert!(outcome.finished);
        assert_eq!(h.backend.call_count(), 2);
        let warnings = observer.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Subagent delegation is unavailable"));
        let results = system_messages_starting_with(&history, "Subagent results:");
        assert!(results[0].content.contains(r#""status":"error""#));
        assert!(results[0].content.contains("Subagent delegation is unavailable"));
    }

    #[tokio::test]
    async fn subagent_runs_in_an_isolated_scope() {
        let h = Harness::texts(&[
            &fenced(r#"{"subagent_calls":[{"id":"s1","task":"List files","allowedTools":["list_dir"]}]}"#),
            &tool_reply("r", "read_file", json!({"path": "secret.txt"})),
            "Nothing to report.",
            "All done.",
        ]);
        let observer = RecordingObserver::new();
        let mut history = user_history("delegate");

        let outcome = h
            .conductor()
            .with_subagents(true)
            .run_turn(&mut history, &observer)
            .await
            .unwrap();

        assert!(outcome.finished);
        assert_eq!(outcome.rounds, 2);

        let requests = h.backend.requests();
        assert_eq!(requests.len(), 4);

        // The nested turn starts fresh, without streaming or project context
        let nested = &requests[1];
        assert!(!nested.stream);
        assert!(!nested.include_project_context);
        assert_eq!(nested.messages.len(), 2);
        assert_eq!(nested.messages[1].content, "List files");

        // read_file was outside the allowed set
        let nested_results = requests[2].messages.last().unwrap();
        assert!(nested_results.content.contains(r#""status":"denied""#));
        assert!(nested_results.content.contains(TOOL_NOT_ALLOWED_REASON));

        let results = system_messages_starting_with(&history, "Subagent results:");
        assert_eq!(results.len(), 1);
        assert!(results[0].content.contains(r#""status":"ok","output":"Nothing to report.""#));
        assert!(results[0].content.contains(r#""rounds":"2""#));

        // Nested events carry their depth
        let nested_texts: Vec<_> = observer
            .events()
            .into_iter()
            .filter(|e| matches!(e, TurnEvent::AssistantText { .. }) && e.depth() == 1)
            .collect();
        assert_eq!(nested_texts.len(), 2);
    }

    #[tokio::test]
    async fn subagent_round_limit_is_a_timeout() {
        let looping = tool_reply("1", "list_dir", json!({}));
        let h = Harness::texts(&[
            &fenced(r#"{"subagent_calls":[{"id":"s1","task":"Spin","maxRounds":1}]}"#),
            &looping,
            "Subagent got stuck.",
        ]);
        let mut history = user_history("delegate");

        h.conductor()
            .with_subagents(true)
            .run_turn(&mut history, &RecordingObserver::new())
            .await
            .unwrap();

        let results = system_messages_starting_with(&history, "Subagent results:");
        assert!(results[0].content.contains(r#""status":"timeout""#));
        assert!(results[0].content.contains(subagent::EMPTY_SUBAGENT_OUTPUT));
    }

    #[tokio::test]
    async fn nested_delegation_respects_the_depth_limit() {
        let h = Harness::texts(&[
            &fenced(r#"{"subagent_calls":[{"id":"outer","task":"Go deeper"}]}"#),
            &fenced(r#"{"subagent_calls":[{"id":"inner","task":"Deeper still"}]}"#),
            "Could not delegate further.",
            "Finished.",
        ]);
        let mut history = user_history("delegate");

        let outcome = h
            .conductor()
            .with_subagents(true)
            .with_config(TurnConfig {
                max_subagent_depth: 1,
                ..TurnConfig::default()
            })
            .run_turn(&mut history, &RecordingObserver::new())
            .await
            .unwrap();

        assert!(outcome.finished);
        assert_eq!(h.backend.call_count(), 4);
        let nested_results = h.backend.requests()[2].messages.last().unwrap().clone();
        assert!(nested_results.content.starts_with("Subagent results:"));
        assert!(nested_results.content.contains("nesting limit"));
    }

    #[tokio::test]
    async fn subagent_backend_failure_becomes_an_error_result() {
        let h = Harness::new(vec![
            Ok(AssistantReply::text(fenced(r#"{"subagent_calls":[{"id":"s1","task":"Try"}]}"#))),
            Err(BackendError::Timeout("30s".into())),
            Ok(AssistantReply::text("The subagent failed.")),
        ]);
        let mut history = user_history("delegate");

        let outcome = h
            .conductor()
            .with_subagents(true)
            .run_turn(&mut history, &RecordingObserver::new())
            .await
            .unwrap();

        assert!(outcome.finished);
        let results = system_messages_starting_with(&history, "Subagent results:");
        assert!(results[0].content.contains(r#""status":"error""#));
        assert!(results[0].content.contains("timed out"));
    }

    #[test]
    fn scope_filter() {
        let open = TurnScope::top_level(&TurnConfig::default());
        assert!(ToolName::ALL.iter().all(|t| open.allows(*t)));

        let narrow = TurnScope {
            allowed_tools: Some(vec![ToolName::Grep]),
            ..open.clone()
        };
        assert!(narrow.allows(ToolName::Grep));
        assert!(!narrow.allows(ToolName::WriteFile));

        let none = TurnScope {
            allowed_tools: Some(Vec::new()),
            ..open
        };
        assert!(!none.allows(ToolName::ReadFile));
    }
}
