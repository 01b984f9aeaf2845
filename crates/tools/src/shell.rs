//! `run_command`: execute a shell command inside the workspace.
//!
//! Commands run through `sh -c` (`cmd /C` on Windows) with a timeout. The
//! Risk Gate has already classified the command text by the time it gets
//! here.

use std::path::Path;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};
use yips_core::error::ToolError;

/// Default time a command may run.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Combined output beyond this many bytes is cut off.
pub const MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// How a finished command went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub output: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run `command` in `cwd`, killing it after `timeout`.
pub async fn run_command(command: &str, cwd: &Path, timeout: Duration) -> Result<CommandOutput, ToolError> {
    debug!(command = %command, cwd = %cwd.display(), "Executing shell command");

    let mut cmd = if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", command]);
        c
    } else {
        let mut c = Command::new("sh");
        c.args(["-c", command]);
        c
    };
    cmd.current_dir(cwd).kill_on_drop(true);

    let started = Instant::now();
    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(result) => result.map_err(|e| ToolError::ExecutionFailed {
            tool_name: "run_command".into(),
            reason: format!("Failed to start command: {e}"),
        })?,
        Err(_) => {
            warn!(command = %command, timeout_ms = timeout.as_millis() as u64, "Command timed out");
            return Err(ToolError::Timeout {
                tool_name: "run_command".into(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let exit_code = output.status.code().unwrap_or(-1);

    let mut text = match (stdout.trim().is_empty(), stderr.trim().is_empty()) {
        (_, true) => stdout.trim_end().to_string(),
        (true, false) => format!("[stderr]\n{}", stderr.trim_end()),
        (false, false) => format!("{}\n[stderr]\n{}", stdout.trim_end(), stderr.trim_end()),
    };
    if text.len() > MAX_OUTPUT_BYTES {
        let mut cut = MAX_OUTPUT_BYTES;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("\n... [output truncated]");
    }
    if exit_code != 0 {
        warn!(command = %command, exit_code, "Command failed");
        text = format!("[exit code: {exit_code}]\n{text}");
    }

    Ok(CommandOutput {
        exit_code,
        output: text.trim_end().to_string(),
        duration_ms: started.elapsed().as_millis() as u64,
    })
}
