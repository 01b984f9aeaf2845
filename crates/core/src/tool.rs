//! Tool calls, results, and the executor abstraction.
//!
//! Tool names form a closed allow-list. Each name has its own typed
//! argument struct, so a call that made it past the envelope parser is
//! already known to be well-formed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The fixed set of tools the model may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    ReadFile,
    WriteFile,
    EditFile,
    ListDir,
    Grep,
    RunCommand,
    PreviewWriteFile,
    ApplyFileChange,
}

impl ToolName {
    pub const ALL: [ToolName; 8] = [
        ToolName::ReadFile,
        ToolName::WriteFile,
        ToolName::EditFile,
        ToolName::ListDir,
        ToolName::Grep,
        ToolName::RunCommand,
        ToolName::PreviewWriteFile,
        ToolName::ApplyFileChange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadFile => "read_file",
            Self::WriteFile => "write_file",
            Self::EditFile => "edit_file",
            Self::ListDir => "list_dir",
            Self::Grep => "grep",
            Self::RunCommand => "run_command",
            Self::PreviewWriteFile => "preview_write_file",
            Self::ApplyFileChange => "apply_file_change",
        }
    }

    /// One-line usage hint (sent to the model in the protocol prompt).
    pub fn usage(&self) -> &'static str {
        match self {
            Self::ReadFile => r#"read_file {"path"}: read a text file"#,
            Self::WriteFile => r#"write_file {"path","content"}: create or overwrite a file"#,
            Self::EditFile => {
                r#"edit_file {"path","old_text","new_text","replace_all"?}: replace exact text in a file"#
            }
            Self::ListDir => r#"list_dir {"path"?}: list a directory (default: workspace root)"#,
            Self::Grep => {
                r#"grep {"pattern","path"?,"include"?}: regex search across files, include is a file-name glob"#
            }
            Self::RunCommand => {
                r#"run_command {"command","cwd"?,"timeout_ms"?}: run a shell command"#
            }
            Self::PreviewWriteFile => {
                r#"preview_write_file {"path","content"}: stage a write and get a diff plus a token"#
            }
            Self::ApplyFileChange => {
                r#"apply_file_change {"token"}: apply a previously previewed change"#
            }
        }
    }

    /// Whether this tool mutates the filesystem directly.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::WriteFile | Self::EditFile | Self::PreviewWriteFile | Self::ApplyFileChange
        )
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not on the tool allow-list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tool '{0}'")]
pub struct UnknownTool(pub String);

impl FromStr for ToolName {
    type Err = UnknownTool;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTool(s.to_string()))
    }
}

// --- Typed arguments ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadFileArgs {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteFileArgs {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditFileArgs {
    pub path: String,
    #[serde(alias = "old_string", alias = "find")]
    pub old_text: String,
    #[serde(alias = "new_string", alias = "replace")]
    pub new_text: String,
    #[serde(default)]
    pub replace_all: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListDirArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrepArgs {
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// File-name glob such as `*.rs`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCommandArgs {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewWriteFileArgs {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyFileChangeArgs {
    pub token: String,
}

/// A tool request with its typed arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum ToolRequest {
    ReadFile(ReadFileArgs),
    WriteFile(WriteFileArgs),
    EditFile(EditFileArgs),
    ListDir(ListDirArgs),
    Grep(GrepArgs),
    RunCommand(RunCommandArgs),
    PreviewWriteFile(PreviewWriteFileArgs),
    ApplyFileChange(ApplyFileChangeArgs),
}

impl ToolRequest {
    /// Decode the arguments object for `name` into its typed struct.
    pub fn from_parts(
        name: ToolName,
        arguments: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        use serde_json::from_value;
        Ok(match name {
            ToolName::ReadFile => Self::ReadFile(from_value(arguments)?),
            ToolName::WriteFile => Self::WriteFile(from_value(arguments)?),
            ToolName::EditFile => Self::EditFile(from_value(arguments)?),
            ToolName::ListDir => Self::ListDir(from_value(arguments)?),
            ToolName::Grep => Self::Grep(from_value(arguments)?),
            ToolName::RunCommand => Self::RunCommand(from_value(arguments)?),
            ToolName::PreviewWriteFile => Self::PreviewWriteFile(from_value(arguments)?),
            ToolName::ApplyFileChange => Self::ApplyFileChange(from_value(arguments)?),
        })
    }

    pub fn name(&self) -> ToolName {
        match self {
            Self::ReadFile(_) => ToolName::ReadFile,
            Self::WriteFile(_) => ToolName::WriteFile,
            Self::EditFile(_) => ToolName::EditFile,
            Self::ListDir(_) => ToolName::ListDir,
            Self::Grep(_) => ToolName::Grep,
            Self::RunCommand(_) => ToolName::RunCommand,
            Self::PreviewWriteFile(_) => ToolName::PreviewWriteFile,
            Self::ApplyFileChange(_) => ToolName::ApplyFileChange,
        }
    }

    /// The filesystem path this request targets, if it has one.
    ///
    /// `list_dir` and `grep` without a path target the workspace root and
    /// report `"."`.
    pub fn target_path(&self) -> Option<&str> {
        match self {
            Self::ReadFile(a) => Some(&a.path),
            Self::WriteFile(a) => Some(&a.path),
            Self::EditFile(a) => Some(&a.path),
            Self::PreviewWriteFile(a) => Some(&a.path),
            Self::ListDir(a) => Some(a.path.as_deref().unwrap_or(".")),
            Self::Grep(a) => Some(a.path.as_deref().unwrap_or(".")),
            Self::RunCommand(_) | Self::ApplyFileChange(_) => None,
        }
    }
}

/// A request to execute a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Call ID, unique within one round
    pub id: String,

    /// The tool and its arguments
    pub request: ToolRequest,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, request: ToolRequest) -> Self {
        Self {
            id: id.into(),
            request,
        }
    }

    pub fn name(&self) -> ToolName {
        self.request.name()
    }
}

/// Outcome of a single action (tool, skill or subagent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Ok,
    Error,
    Denied,
    Timeout,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Denied => "denied",
            Self::Timeout => "timeout",
        }
    }

    /// Errors and timeouts count as failures; denials are informative.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Error | Self::Timeout)
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Which tool produced it
    pub tool: ToolName,

    pub status: ActionStatus,

    /// The output content
    pub output: String,

    /// Structured extras such as a staged-change token
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ToolResult {
    pub fn new(
        call: &ToolCall,
        status: ActionStatus,
        output: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call.id.clone(),
            tool: call.name(),
            status,
            output: output.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn ok(call: &ToolCall, output: impl Into<String>) -> Self {
        Self::new(call, ActionStatus::Ok, output)
    }

    pub fn error(call: &ToolCall, output: impl Into<String>) -> Self {
        Self::new(call, ActionStatus::Error, output)
    }

    pub fn denied(call: &ToolCall, output: impl Into<String>) -> Self {
        Self::new(call, ActionStatus::Denied, output)
    }

    pub fn timeout(call: &ToolCall, output: impl Into<String>) -> Self {
        Self::new(call, ActionStatus::Timeout, output)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Executes tool calls.
///
/// Implementations must never fail: every problem is reported as a result
/// with `status = error` (or `timeout`). `execute` returns exactly one
/// result per call, in input order.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute a single call.
    async fn execute_one(&self, call: &ToolCall) -> ToolResult;

    /// Execute calls one after another, in order.
    async fn execute(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute_one(call).await);
        }
        results
    }
}
