//! Result summaries: the system messages that feed action results back to
//! the model.
//!
//! Each exercised category becomes one message: a header line followed by
//! one compact JSON object per result, in execution order.

use serde::Serialize;
use std::collections::BTreeMap;
use yips_core::action::{SkillResult, SubagentResult};
use yips_core::tool::{ActionStatus, ToolResult};

pub const TOOL_RESULTS_HEADER: &str = "Tool results:";
pub const SKILL_RESULTS_HEADER: &str = "Skill results:";
pub const SUBAGENT_RESULTS_HEADER: &str = "Subagent results:";

const TRUNCATION_MARKER: &str = "... [truncated]";

// Field order is the wire order.
#[derive(Serialize)]
struct SummaryLine<'a> {
    id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skill: Option<&'a str>,
    status: ActionStatus,
    output: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    metadata: &'a BTreeMap<String, String>,
}

impl SummaryLine<'_> {
    fn render(&self) -> String {
        // Only strings and string maps inside; serialization cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Cut `output` to at most `limit` characters.
pub fn truncate_output(output: &str, limit: usize) -> String {
    match output.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &output[..cut]),
        None => output.to_string(),
    }
}

fn render(header: &str, lines: impl Iterator<Item = String>) -> String {
    let mut out = String::from(header);
    for line in lines {
        out.push('\n');
        out.push_str(&line);
    }
    out
}

pub fn tool_results_message(results: &[ToolResult], limit: usize) -> String {
    render(
        TOOL_RESULTS_HEADER,
        results.iter().map(|r| {
            SummaryLine {
                id: &r.call_id,
                tool: Some(r.tool.as_str()),
                skill: None,
                status: r.status,
                output: truncate_output(&r.output, limit),
                metadata: &r.metadata,
            }
            .render()
        }),
    )
}

pub fn skill_results_message(results: &[SkillResult], limit: usize) -> String {
    render(
        SKILL_RESULTS_HEADER,
        results.iter().map(|r| {
            SummaryLine {
                id: &r.call_id,
                tool: None,
                skill: Some(&r.skill),
                status: r.status,
                output: truncate_output(&r.output, limit),
                metadata: &r.metadata,
            }
            .render()
        }),
    )
}

pub fn subagent_results_message(results: &[SubagentResult], limit: usize) -> String {
    render(
        SUBAGENT_RESULTS_HEADER,
        results.iter().map(|r| {
            SummaryLine {
                id: &r.call_id,
                tool: None,
                skill: None,
                status: r.status,
                output: truncate_output(&r.output, limit),
                metadata: &r.metadata,
            }
            .render()
        }),
    )
}
