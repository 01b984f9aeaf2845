//! Shared test helpers for conductor tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use yips_core::action::{SkillCall, SkillExecutor, SkillResult};
use yips_core::backend::{AssistantBackend, AssistantReply, AssistantRequest};
use yips_core::error::BackendError;
use yips_core::tool::{ActionStatus, ToolCall, ToolExecutor, ToolResult};
use yips_security::approval::{Approver, ConfirmationRequest};

/// A backend that returns a sequence of scripted replies.
///
/// Each call to `request` returns the next reply in the queue and records
/// the request. Panics if more calls are made than replies provided.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<AssistantReply, BackendError>>>,
    requests: Mutex<Vec<AssistantRequest>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<Result<AssistantReply, BackendError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<AssistantRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl AssistantBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn request(&self, request: AssistantRequest) -> Result<AssistantReply, BackendError> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request);
        let call = requests.len();
        drop(requests);

        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedBackend: no more replies (call #{call})"))
    }
}

/// Wrap an envelope body in a `yips-agent` fence.
pub fn fenced(json: &str) -> String {
    format!("```yips-agent\n{json}\n```")
}

/// A fenced reply with exactly one tool call.
pub fn tool_reply(id: &str, name: &str, arguments: serde_json::Value) -> String {
    fenced(
        &serde_json::json!({
            "tool_calls": [{"id": id, "name": name, "arguments": arguments}]
        })
        .to_string(),
    )
}

/// A tool executor that answers every call with the same status.
pub struct StatusTools(pub ActionStatus);

#[async_trait]
impl ToolExecutor for StatusTools {
    async fn execute_one(&self, call: &ToolCall) -> ToolResult {
        ToolResult::new(call, self.0, format!("{} {}", call.name(), self.0))
    }
}

/// Echoes the skill name back.
pub struct EchoSkills;

#[async_trait]
impl SkillExecutor for EchoSkills {
    async fn execute_one(&self, call: &SkillCall) -> SkillResult {
        SkillResult::new(call, ActionStatus::Ok, format!("ran {}", call.name))
    }
}

/// An approver that answers with a fixed decision and counts how often it
/// was asked.
pub struct CountingApprover {
    answer: bool,
    asked: AtomicUsize,
}

impl CountingApprover {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: AtomicUsize::new(0),
        }
    }

    pub fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Approver for CountingApprover {
    async fn approve(&self, _request: &ConfirmationRequest) -> bool {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}
