//! Read-only file tools: `read_file` and `list_dir`.

use std::path::Path;
use yips_core::error::ToolError;

/// Files larger than this are cut off in the tool output.
pub const MAX_READ_BYTES: usize = 256 * 1024;

/// Read a text file, truncating past [`MAX_READ_BYTES`].
pub async fn read_file(path: &Path, display_path: &str) -> Result<String, ToolError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| ToolError::ExecutionFailed {
        tool_name: "read_file".into(),
        reason: format!("Failed to read {display_path}: {e}"),
    })?;

    if bytes.len() <= MAX_READ_BYTES {
        return Ok(String::from_utf8_lossy(&bytes).into_owned());
    }

    let mut text = String::from_utf8_lossy(&bytes[..MAX_READ_BYTES]).into_owned();
    // A cut inside a multi-byte char shows up as a trailing replacement char
    if text.ends_with('\u{FFFD}') {
        text.pop();
    }
    text.push_str(&format!(
        "\n... [truncated: showing {MAX_READ_BYTES} of {} bytes]",
        bytes.len()
    ));
    Ok(text)
}

/// List a directory: sorted names, directories suffixed with `/`.
pub async fn list_dir(path: &Path, display_path: &str) -> Result<String, ToolError> {
    let fail = |reason: String| ToolError::ExecutionFailed {
        tool_name: "list_dir".into(),
        reason,
    };

    let mut reader = tokio::fs::read_dir(path)
        .await
        .map_err(|e| fail(format!("Failed to list {display_path}: {e}")))?;

    let mut names = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|e| fail(format!("Failed to list {display_path}: {e}")))?
    {
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            name.push('/');
        }
        names.push(name);
    }

    if names.is_empty() {
        return Ok(format!("{display_path} is empty"));
    }
    names.sort();
    Ok(names.join("\n"))
}
