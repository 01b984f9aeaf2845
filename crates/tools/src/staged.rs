//! Staged Change Store: two-phase file writes.
//!
//! `preview` records the intended content under a fresh single-use token
//! and returns a diff; nothing touches the disk until `apply` is called
//! with that token. One store belongs to one session and is shared by the
//! session's subagents.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};
use yips_core::error::ToolError;

use crate::diff::render_preview;

/// Default lifetime of a staged change.
pub const DEFAULT_TTL_SECS: i64 = 600;

/// Maximum diff lines in a preview.
pub const PREVIEW_MAX_LINES: usize = 200;

/// Reason tag for apply attempts with an unknown, used or expired token.
pub const INVALID_TOKEN_REASON: &str = "invalid-or-expired-token";

/// Time source for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|n| *n).unwrap_or_else(|_| Utc::now())
    }
}

/// A pending file mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedChange {
    pub token: String,
    /// Path as the model wrote it
    pub display_path: String,
    /// Resolved absolute path
    pub path: PathBuf,
    pub before_content: String,
    pub after_content: String,
    pub is_new_file: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// What `preview` hands back to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedPreview {
    pub token: String,
    pub path: String,
    pub preview: String,
    pub is_new_file: bool,
    pub expires_at: DateTime<Utc>,
}

/// A change that reached the disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedChange {
    pub token: String,
    pub display_path: String,
    pub path: PathBuf,
    pub content: String,
}

/// Why an apply did not happen.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("Staged change token is unknown, already used, or expired: {token}")]
    InvalidOrExpired { token: String },

    #[error("Failed to write staged change to {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ApplyError {
    /// Machine-readable reason tag for result metadata.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidOrExpired { .. } => INVALID_TOKEN_REASON,
            Self::Write { .. } => "write-failed",
        }
    }
}

fn preview_failed(reason: String) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: "preview_write_file".into(),
        reason,
    }
}

/// Per-session store of pending changes keyed by token.
pub struct StagedChangeStore {
    entries: Mutex<HashMap<String, StagedChange>>,
    ttl: Duration,
    clock: Box<dyn Clock>,
}

impl std::fmt::Debug for StagedChangeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedChangeStore")
            .field("pending", &self.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl Default for StagedChangeStore {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_TTL_SECS))
    }
}

impl StagedChangeStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stage `new_content` for `path` and return a diff preview.
    ///
    /// A missing file counts as empty and is flagged as new. The
    /// filesystem is not modified.
    pub async fn preview(
        &self,
        display_path: &str,
        path: &Path,
        new_content: &str,
    ) -> Result<StagedPreview, ToolError> {
        let (before, is_new_file) = match tokio::fs::read_to_string(path).await {
            Ok(content) => (content, false),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (String::new(), true),
            Err(e) => return Err(preview_failed(format!("Failed to read {display_path}: {e}"))),
        };

        let preview = render_preview(display_path, &before, new_content, is_new_file, PREVIEW_MAX_LINES);
        let token = uuid::Uuid::new_v4().to_string();
        let created_at = self.clock.now();
        let expires_at = created_at + self.ttl;

        let change = StagedChange {
            token: token.clone(),
            display_path: display_path.to_string(),
            path: path.to_path_buf(),
            before_content: before,
            after_content: new_content.to_string(),
            is_new_file,
            created_at,
            expires_at,
        };

        self.entries
            .lock()
            .map_err(|_| preview_failed("Staged change store is unavailable".into()))?
            .insert(token.clone(), change);

        debug!(token = %token, path = %display_path, is_new_file, "Staged change");

        Ok(StagedPreview {
            token,
            path: display_path.to_string(),
            preview,
            is_new_file,
            expires_at,
        })
    }

    /// Write a staged change to disk.
    ///
    /// A token is consumed by the first successful apply. While a write is
    /// in flight the token is out of the map, so a concurrent apply of the
    /// same token is rejected. A failed write puts the change back until it
    /// expires.
    pub async fn apply(&self, token: &str) -> Result<AppliedChange, ApplyError> {
        let change = self.take_live(token).ok_or_else(|| ApplyError::InvalidOrExpired {
            token: token.to_string(),
        })?;

        if let Err(source) = write_change(&change).await {
            warn!(token = %change.token, path = %change.display_path, error = %source, "Staged change write failed");
            let err = ApplyError::Write {
                path: change.display_path.clone(),
                source,
            };
            self.restore(change);
            return Err(err);
        }

        info!(token = %change.token, path = %change.display_path, "Applied staged change");

        Ok(AppliedChange {
            token: change.token,
            display_path: change.display_path,
            path: change.path,
            content: change.after_content,
        })
    }

    /// Remove and return the entry if it exists and has not expired.
    /// Expired entries are purged on the way.
    fn take_live(&self, token: &str) -> Option<StagedChange> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().ok()?;
        entries.retain(|_, change| change.expires_at > now);
        entries.remove(token)
    }

    /// Return a change whose write failed. Expired changes stay gone.
    fn restore(&self, change: StagedChange) {
        if change.expires_at <= self.clock.now() {
            return;
        }
        if let Ok(mut entries) = self.entries.lock() {
            entries.entry(change.token.clone()).or_insert(change);
        }
    }

    /// Drop every expired entry; returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|_, change| change.expires_at > now);
        before - entries.len()
    }

    /// Look at a pending change without consuming it.
    pub fn get(&self, token: &str) -> Option<StagedChange> {
        self.entries.lock().ok()?.get(token).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn write_change(change: &StagedChange) -> std::io::Result<()> {
    if let Some(parent) = change.path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&change.path, &change.after_content).await
}
