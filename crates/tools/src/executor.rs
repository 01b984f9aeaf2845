//! The workspace tool executor: runs the eight built-in tools.
//!
//! One executor serves one session. It owns the session's
//! [`StagedChangeStore`], resolves every path against the workspace root,
//! and folds every failure into a [`ToolResult`].

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use yips_core::error::ToolError;
use yips_core::tool::{ToolCall, ToolExecutor, ToolRequest, ToolResult};
use yips_security::path::{canonical_root, resolve_in_workspace};

use crate::shell::DEFAULT_COMMAND_TIMEOUT;
use crate::staged::StagedChangeStore;
use crate::{file_read, file_write, search, shell};

/// Runs after a file was written by `write_file`, `edit_file` or
/// `apply_file_change` (formatters, indexers, editors).
///
/// A failing hook is logged and never fails the write.
#[async_trait]
pub trait PostWriteHook: Send + Sync {
    async fn on_write(&self, path: &Path, content: &str) -> Result<(), ToolError>;
}

/// Executes tool calls against one workspace root.
pub struct WorkspaceToolExecutor {
    root: PathBuf,
    staged: Arc<StagedChangeStore>,
    post_write_hook: Option<Arc<dyn PostWriteHook>>,
    command_timeout: Duration,
}

impl std::fmt::Debug for WorkspaceToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceToolExecutor")
            .field("root", &self.root)
            .field("staged", &self.staged)
            .field("has_post_write_hook", &self.post_write_hook.is_some())
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

impl WorkspaceToolExecutor {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: canonical_root(root.as_ref()),
            staged: Arc::new(StagedChangeStore::default()),
            post_write_hook: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_staged_store(mut self, store: Arc<StagedChangeStore>) -> Self {
        self.staged = store;
        self
    }

    pub fn with_post_write_hook(mut self, hook: Arc<dyn PostWriteHook>) -> Self {
        self.post_write_hook = Some(hook);
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn staged_store(&self) -> &Arc<StagedChangeStore> {
        &self.staged
    }

    fn resolve(&self, raw: &str) -> PathBuf {
        resolve_in_workspace(&self.root, raw)
    }

    async fn notify_write(&self, path: &Path, content: &str) {
        if let Some(hook) = &self.post_write_hook
            && let Err(e) = hook.on_write(path, content).await
        {
            warn!(path = %path.display(), error = %e, "Post-write hook failed");
        }
    }

    async fn dispatch(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        match &call.request {
            ToolRequest::ReadFile(args) => {
                let text = file_read::read_file(&self.resolve(&args.path), &args.path).await?;
                Ok(ToolResult::ok(call, text).with_metadata("path", &args.path))
            }

            ToolRequest::ListDir(args) => {
                let shown = args.path.as_deref().unwrap_or(".");
                let listing = file_read::list_dir(&self.resolve(shown), shown).await?;
                Ok(ToolResult::ok(call, listing).with_metadata("path", shown))
            }

            ToolRequest::WriteFile(args) => {
                let path = self.resolve(&args.path);
                let summary = file_write::write_file(&path, &args.path, &args.content).await?;
                self.notify_write(&path, &args.content).await;
                Ok(ToolResult::ok(call, summary).with_metadata("path", &args.path))
            }

            ToolRequest::EditFile(args) => {
                let path = self.resolve(&args.path);
                let (summary, content) = file_write::edit_file(&path, &args.path, args).await?;
                self.notify_write(&path, &content).await;
                Ok(ToolResult::ok(call, summary).with_metadata("path", &args.path))
            }

            ToolRequest::Grep(args) => {
                let shown = args.path.as_deref().unwrap_or(".");
                let out = search::grep(
                    &self.root,
                    &self.resolve(shown),
                    &args.pattern,
                    args.include.as_deref(),
                )
                .await?;
                Ok(ToolResult::ok(call, out))
            }

            ToolRequest::RunCommand(args) => {
                let cwd = self.resolve(args.cwd.as_deref().unwrap_or("."));
                let timeout = args
                    .timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(self.command_timeout);
                let out = shell::run_command(&args.command, &cwd, timeout).await?;
                let result = if out.success() {
                    ToolResult::ok(call, out.output)
                } else {
                    ToolResult::error(call, out.output)
                };
                Ok(result
                    .with_metadata("exit_code", out.exit_code.to_string())
                    .with_metadata("duration_ms", out.duration_ms.to_string()))
            }

            ToolRequest::PreviewWriteFile(args) => {
                let path = self.resolve(&args.path);
                let preview = self.staged.preview(&args.path, &path, &args.content).await?;
                let output = format!(
                    "Staged change for {} (token {}). Nothing was written yet; call apply_file_change with this token to write it.\n{}",
                    preview.path, preview.token, preview.preview
                );
                Ok(ToolResult::ok(call, output)
                    .with_metadata("token", &preview.token)
                    .with_metadata("path", &preview.path)
                    .with_metadata("expires_at", preview.expires_at.to_rfc3339()))
            }

            ToolRequest::ApplyFileChange(args) => match self.staged.apply(&args.token).await {
                Ok(applied) => {
                    self.notify_write(&applied.path, &applied.content).await;
                    Ok(ToolResult::ok(
                        call,
                        format!("Applied staged change to {}", applied.display_path),
                    )
                    .with_metadata("token", &applied.token)
                    .with_metadata("path", &applied.display_path))
                }
                Err(e) => Ok(ToolResult::error(call, e.to_string())
                    .with_metadata("reason", e.reason())
                    .with_metadata("token", &args.token)),
            },
        }
    }
}

#[async_trait]
impl ToolExecutor for WorkspaceToolExecutor {
    async fn execute_one(&self, call: &ToolCall) -> ToolResult {
        debug!(tool = %call.name(), call_id = %call.id, "Executing tool");
        match self.dispatch(call).await {
            Ok(result) => result,
            Err(ToolError::Timeout { timeout_ms, .. }) => {
                ToolResult::timeout(call, format!("{} timed out after {timeout_ms}ms", call.name()))
                    .with_metadata("timeout_ms", timeout_ms.to_string())
            }
            Err(e) => ToolResult::error(call, e.to_string()),
        }
    }
}
