//! `grep`: regex search across the workspace.

use regex_lite::Regex;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use yips_core::error::ToolError;

/// Stop after this many matching lines.
pub const MAX_MATCHES: usize = 200;

/// Files larger than this are skipped.
const MAX_FILE_BYTES: u64 = 1024 * 1024;

/// Matched lines are shortened to this many chars.
const MAX_LINE_CHARS: usize = 300;

const SKIPPED_DIRS: &[&str] = &["target", "node_modules"];

/// Search `path` (file or directory) for `pattern`.
///
/// Lines are reported as `file:line: text`, with file paths relative to
/// `root` where possible.
pub async fn grep(
    root: &Path,
    path: &Path,
    pattern: &str,
    include: Option<&str>,
) -> Result<String, ToolError> {
    let regex = Regex::new(pattern)
        .map_err(|e| ToolError::InvalidArguments(format!("Invalid regex pattern: {e}")))?;
    let include = include.map(glob_to_regex).transpose()?;

    let root = root.to_path_buf();
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || search(&root, &path, &regex, include.as_ref()))
        .await
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: "grep".into(),
            reason: format!("Search task failed: {e}"),
        })
}

fn search(root: &Path, path: &Path, regex: &Regex, include: Option<&Regex>) -> String {
    let mut lines = Vec::new();
    let mut truncated = false;

    let walker = WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !name.starts_with('.') && !SKIPPED_DIRS.contains(&name.as_ref())
        })
        .filter_map(|e| e.ok());

    'files: for entry in walker {
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.metadata().map(|m| m.len() > MAX_FILE_BYTES).unwrap_or(true) {
            continue;
        }
        if let Some(include) = include {
            let name = entry.file_name().to_string_lossy();
            if !include.is_match(&name) {
                continue;
            }
        }

        // Binary or non-UTF-8 files are skipped
        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            continue;
        };

        let shown = display_path(root, entry.path());
        for (idx, line) in content.lines().enumerate() {
            if !regex.is_match(line) {
                continue;
            }
            if lines.len() >= MAX_MATCHES {
                truncated = true;
                break 'files;
            }
            let text: String = line.trim_end().chars().take(MAX_LINE_CHARS).collect();
            lines.push(format!("{shown}:{}: {text}", idx + 1));
        }
    }

    if lines.is_empty() {
        return "No matches found.".to_string();
    }
    if truncated {
        lines.push(format!("... (stopped after {MAX_MATCHES} matches)"));
    }
    lines.join("\n")
}

fn display_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .map(PathBuf::from)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

/// Translate a file-name glob (`*`, `?`) into an anchored regex.
fn glob_to_regex(glob: &str) -> Result<Regex, ToolError> {
    let mut pattern = String::from("^");
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex_lite::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern)
        .map_err(|e| ToolError::InvalidArguments(format!("Invalid include glob '{glob}': {e}")))
}
