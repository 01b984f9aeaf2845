//! Terminal I/O: the stdin approver, the printing observer and the stream
//! sink.

use async_trait::async_trait;
use std::io::{self, BufRead, Write};
use tracing::debug;
use yips_core::agent::TurnOutcome;
use yips_core::event::{TurnEvent, TurnObserver};
use yips_providers::ChunkSink;
use yips_security::{Approver, ConfirmationRequest};

/// Read one line from stdin without blocking the runtime.
///
/// `None` on end of input.
pub async fn read_line() -> io::Result<Option<String>> {
    tokio::task::spawn_blocking(|| -> io::Result<Option<String>> {
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line)? {
            0 => Ok(None),
            _ => Ok(Some(line.trim_end_matches(['\r', '\n']).to_string())),
        }
    })
    .await
    .map_err(io::Error::other)?
}

/// Asks on the terminal before confirm-level actions run.
pub struct StdinApprover;

#[async_trait]
impl Approver for StdinApprover {
    async fn approve(&self, request: &ConfirmationRequest) -> bool {
        eprintln!("{}  {}", indent(request.depth), request.summary);
        eprint!("{}{} ", indent(request.depth), confirmation_prompt(request));
        let _ = io::stderr().flush();

        match read_line().await {
            Ok(Some(answer)) => is_yes(&answer),
            Ok(None) => false,
            Err(e) => {
                debug!(error = %e, "Failed to read confirmation");
                false
            }
        }
    }
}

pub fn confirmation_prompt(request: &ConfirmationRequest) -> String {
    format!("Allow {} ({})? [y/N]", request.tool, request.reasons.join(", "))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Prints assistant text and warnings.
pub struct TerminalObserver;

impl TurnObserver for TerminalObserver {
    fn on_event(&self, event: &TurnEvent) {
        match event {
            TurnEvent::AssistantText { text, rendered, depth } => {
                if !rendered && !text.trim().is_empty() {
                    println!("{}", format_assistant_text(text, *depth));
                }
            }
            TurnEvent::Warning { message, depth } => {
                eprintln!("{}[warning] {message}", indent(*depth));
            }
            TurnEvent::RoundComplete { round, depth } => {
                debug!(round, depth, "Round complete");
            }
        }
    }
}

fn indent(depth: u32) -> String {
    "  ".repeat(depth as usize)
}

/// Subagent text is indented and tagged so it reads as a side thread.
pub fn format_assistant_text(text: &str, depth: u32) -> String {
    if depth == 0 {
        return text.trim_end().to_string();
    }
    let pad = indent(depth);
    text.trim_end()
        .lines()
        .map(|line| format!("{pad}[subagent] {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One status line after a turn, e.g. `[2 rounds, 1532 tokens, 41.7 tok/s]`.
pub fn format_outcome(outcome: &TurnOutcome) -> String {
    let mut parts = vec![match outcome.rounds {
        1 => "1 round".to_string(),
        n => format!("{n} rounds"),
    }];
    match outcome.used_tokens_exact {
        Some(tokens) => parts.push(format!("{tokens} tokens")),
        None => parts.push(format!("~{} tokens", outcome.estimated_history_tokens)),
    }
    if let Some(rate) = outcome.latest_output_tokens_per_second {
        parts.push(format!("{rate:.1} tok/s"));
    }
    format!("[{}]", parts.join(", "))
}

/// Writes streamed reply text straight to stdout.
pub struct StdoutSink;

impl ChunkSink for StdoutSink {
    fn on_chunk(&self, text: &str) {
        let mut out = io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    fn on_finish(&self) {
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yips_core::tool::ToolName;

    #[test]
    fn prompt_names_tool_and_reasons() {
        let request = ConfirmationRequest {
            call_id: "1".into(),
            tool: ToolName::RunCommand,
            summary: "git push --force".into(),
            reasons: vec!["git-force-push".into(), "cwd-outside-workspace".into()],
            depth: 0,
        };
        assert_eq!(
            confirmation_prompt(&request),
            "Allow run_command (git-force-push, cwd-outside-workspace)? [y/N]"
        );
    }

    #[test]
    fn only_explicit_yes_approves() {
        assert!(is_yes("y"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("n"));
        assert!(!is_yes("sure"));
    }

    #[test]
    fn subagent_text_is_indented() {
        assert_eq!(format_assistant_text("Done.\n", 0), "Done.");
        assert_eq!(
            format_assistant_text("line one\nline two", 1),
            "  [subagent] line one\n  [subagent] line two"
        );
    }

    #[test]
    fn outcome_line() {
        let outcome = TurnOutcome {
            finished: true,
            rounds: 2,
            used_tokens_exact: Some(1532),
            latest_output_tokens_per_second: Some(41.66),
            estimated_history_tokens: 900,
        };
        assert_eq!(format_outcome(&outcome), "[2 rounds, 1532 tokens, 41.7 tok/s]");

        let estimated = TurnOutcome {
            rounds: 1,
            used_tokens_exact: None,
            latest_output_tokens_per_second: None,
            ..outcome
        };
        assert_eq!(format_outcome(&estimated), "[1 round, ~900 tokens]");
    }
}
