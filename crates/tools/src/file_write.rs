//! Mutating file tools: `write_file` and `edit_file`.

use std::path::Path;
use yips_core::error::ToolError;
use yips_core::tool::EditFileArgs;

fn failed(tool: &str, reason: String) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: tool.into(),
        reason,
    }
}

/// Write `content` to `path`, creating parent directories.
pub async fn write_file(path: &Path, display_path: &str, content: &str) -> Result<String, ToolError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| failed("write_file", format!("Failed to create directory for {display_path}: {e}")))?;
    }

    tokio::fs::write(path, content)
        .await
        .map_err(|e| failed("write_file", format!("Failed to write {display_path}: {e}")))?;

    Ok(format!("Wrote {} bytes to {display_path}", content.len()))
}

/// Replace exact text inside a file.
///
/// Returns the new content alongside the summary so callers can run
/// post-write hooks on it.
pub async fn edit_file(
    path: &Path,
    display_path: &str,
    args: &EditFileArgs,
) -> Result<(String, String), ToolError> {
    if args.old_text.is_empty() {
        return Err(ToolError::InvalidArguments(
            "edit_file needs a non-empty old_text".into(),
        ));
    }

    let original = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| failed("edit_file", format!("Failed to read {display_path}: {e}")))?;

    let occurrences = original.matches(args.old_text.as_str()).count();
    let updated = match occurrences {
        0 => {
            return Err(failed(
                "edit_file",
                format!("old_text was not found in {display_path}"),
            ));
        }
        1 => original.replacen(&args.old_text, &args.new_text, 1),
        _ if args.replace_all => original.replace(&args.old_text, &args.new_text),
        n => {
            return Err(failed(
                "edit_file",
                format!(
                    "old_text matches {n} places in {display_path}; add surrounding context or set replace_all"
                ),
            ));
        }
    };

    tokio::fs::write(path, &updated)
        .await
        .map_err(|e| failed("edit_file", format!("Failed to write {display_path}: {e}")))?;

    let plural = if occurrences == 1 { "" } else { "s" };
    Ok((
        format!("Replaced {occurrences} occurrence{plural} in {display_path}"),
        updated,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit(old: &str, new: &str, replace_all: bool) -> EditFileArgs {
        EditFileArgs {
            path: "f.txt".into(),
            old_text: old.into(),
            new_text: new.into(),
            replace_all,
        }
    }

    #[tokio::test]
    async fn write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c.txt");

        let summary = write_file(&path, "a/b/c.txt", "hey").await.unwrap();
        assert_eq!(summary, "Wrote 3 bytes to a/b/c.txt");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hey");
    }

    #[tokio::test]
    async fn edit_replaces_unique_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "fn main() {}\n").unwrap();

        let (summary, content) = edit_file(&path, "f.txt", &edit("main", "start", false))
            .await
            .unwrap();
        assert_eq!(summary, "Replaced 1 occurrence in f.txt");
        assert_eq!(content, "fn start() {}\n");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "fn start() {}\n");
    }

    #[tokio::test]
    async fn edit_refuses_ambiguous_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "x x x").unwrap();

        let err = edit_file(&path, "f.txt", &edit("x", "y", false)).await.unwrap_err();
        assert!(err.to_string().contains("matches 3 places"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "x x x");
    }

    #[tokio::test]
    async fn edit_replace_all() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "x x x").unwrap();

        let (summary, _) = edit_file(&path, "f.txt", &edit("x", "y", true)).await.unwrap();
        assert_eq!(summary, "Replaced 3 occurrences in f.txt");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "y y y");
    }

    #[tokio::test]
    async fn edit_missing_text_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "abc").unwrap();

        let err = edit_file(&path, "f.txt", &edit("zzz", "y", false)).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
