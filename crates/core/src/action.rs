//! Skill and subagent calls.
//!
//! Structurally these mirror tool calls; a subagent call additionally
//! describes the scope of the delegated sub-turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::tool::{ActionStatus, ToolName};

/// A request to run a named skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

/// The result of a skill execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillResult {
    pub call_id: String,
    pub skill: String,
    pub status: ActionStatus,
    pub output: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl SkillResult {
    pub fn new(call: &SkillCall, status: ActionStatus, output: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            skill: call.name.clone(),
            status,
            output: output.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A request to delegate a task to a scoped sub-turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubagentCall {
    pub id: String,
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Tools the sub-turn may use; `None` means all tools.
    #[serde(default, rename = "allowedTools", skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<ToolName>>,
    #[serde(default, rename = "maxRounds", skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<u32>,
}

/// The result of a delegated sub-turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubagentResult {
    pub call_id: String,
    pub status: ActionStatus,
    pub output: String,
    /// Rounds the sub-turn used (0 if it never started)
    pub rounds: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl SubagentResult {
    pub fn new(call: &SubagentCall, status: ActionStatus, output: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            status,
            output: output.into(),
            rounds: 0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = rounds;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Executes skill calls.
///
/// Same contract as [`crate::tool::ToolExecutor`]: never fails, one result
/// per call, in order.
#[async_trait]
pub trait SkillExecutor: Send + Sync {
    async fn execute_one(&self, call: &SkillCall) -> SkillResult;

    async fn execute(&self, calls: &[SkillCall]) -> Vec<SkillResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute_one(call).await);
        }
        results
    }
}
