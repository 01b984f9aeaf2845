//! Path resolution against the workspace root.
//!
//! Tool paths are resolved without requiring them to exist: relative paths
//! join the root, `.` and `..` are folded lexically, and the longest
//! existing prefix is canonicalized so symlinks cannot escape the root.

use std::path::{Component, Path, PathBuf};

/// Resolve a tool-supplied path against `root`.
///
/// `~` expands to the home directory. The result is absolute whenever
/// `root` is.
pub fn resolve_in_workspace(root: &Path, raw: &str) -> PathBuf {
    let expanded = PathBuf::from(expand_tilde(raw.trim()));
    let joined = if expanded.is_absolute() {
        expanded
    } else {
        root.join(expanded)
    };
    canonicalize_existing_prefix(&normalize_lexically(&joined))
}

/// Fold `.` and `..` components without touching the filesystem.
///
/// `..` at the root stays at the root.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Canonicalize the longest prefix of `path` that exists, then re-append
/// the missing tail.
fn canonicalize_existing_prefix(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut tail = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return tail
                .iter()
                .rev()
                .fold(canonical, |acc: PathBuf, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}

/// Canonical form of the workspace root (falls back to the lexical form).
pub fn canonical_root(root: &Path) -> PathBuf {
    let absolute = if root.is_absolute() {
        root.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(root))
            .unwrap_or_else(|_| root.to_path_buf())
    };
    canonicalize_existing_prefix(&normalize_lexically(&absolute))
}

/// Whether `path` lies at or below `root` (component-wise).
pub fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

/// The first forbidden prefix `path` falls under, if any.
///
/// Prefixes may start with `~`. Each prefix is compared both as written and
/// in canonical form, so `/etc` still matches where it is a symlink.
pub fn matching_forbidden_prefix<'a>(path: &Path, forbidden: &'a [String]) -> Option<&'a str> {
    forbidden
        .iter()
        .find(|prefix| {
            let expanded = normalize_lexically(Path::new(&expand_tilde(prefix)));
            if expanded.as_os_str().is_empty() {
                return false;
            }
            path.starts_with(&expanded)
                || expanded
                    .canonicalize()
                    .map(|canonical| path.starts_with(canonical))
                    .unwrap_or(false)
        })
        .map(String::as_str)
}

/// Expand `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> String {
    if (path.starts_with("~/") || path == "~")
        && let Some(home) = home_dir()
    {
        return path.replacen('~', &home, 1);
    }
    path.to_string()
}

fn home_dir() -> Option<String> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE").ok()
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").ok()
    }
}
