//! Envelope parsing: pulling action requests out of assistant replies.
//!
//! Models embed actions in one of two forms:
//!
//! 1. A fenced block tagged `yips-agent` (or the older `yips-tools`)
//!    holding one JSON object:
//!
//!    ````text
//!    Let me look first.
//!    ```yips-agent
//!    {"tool_calls": [{"id": "1", "name": "read_file", "arguments": {"path": "src/main.rs"}}]}
//!    ```
//!    ````
//!
//! 2. A bare reply that is a single JSON object with `actions`,
//!    `tool_calls`, `skill_calls` or `subagent_calls`.
//!
//! Anything else is plain text. Parsing never fails: malformed envelopes
//! degrade to plain text and malformed items are dropped one by one.

use serde_json::{Map, Value};
use std::str::FromStr;
use tracing::debug;
use yips_core::action::{SkillCall, SubagentCall};
use yips_core::tool::{ToolCall, ToolName, ToolRequest};

/// Fence tags, in order of preference.
pub const FENCE_TAGS: [&str; 2] = ["yips-agent", "yips-tools"];

const ENVELOPE_KEYS: [&str; 4] = ["actions", "tool_calls", "skill_calls", "subagent_calls"];

/// Which form the envelope was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeForm {
    Fenced,
    Bare,
    Plain,
}

/// The result of parsing one assistant reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEnvelope {
    /// Text to show the user and keep in history
    pub assistant_text: String,
    pub tool_calls: Vec<ToolCall>,
    pub skill_calls: Vec<SkillCall>,
    pub subagent_calls: Vec<SubagentCall>,
    /// Warnings the model attached to its envelope
    pub warnings: Vec<String>,
    pub form: EnvelopeForm,
}

impl ParsedEnvelope {
    fn plain(raw: &str) -> Self {
        Self {
            assistant_text: raw.to_string(),
            tool_calls: Vec::new(),
            skill_calls: Vec::new(),
            subagent_calls: Vec::new(),
            warnings: Vec::new(),
            form: EnvelopeForm::Plain,
        }
    }

    /// Whether the reply asked for anything to be executed.
    pub fn has_actions(&self) -> bool {
        !self.tool_calls.is_empty() || !self.skill_calls.is_empty() || !self.subagent_calls.is_empty()
    }
}

/// Parse an assistant reply. Never fails.
pub fn parse_envelope(raw: &str) -> ParsedEnvelope {
    if let Some(parsed) = parse_fenced(raw) {
        return parsed;
    }
    if let Some(parsed) = parse_bare(raw) {
        return parsed;
    }
    ParsedEnvelope::plain(raw)
}

/// A located fenced block.
struct FencedBlock<'a> {
    /// Byte range of the whole block, fences included
    start: usize,
    end: usize,
    body: &'a str,
}

fn find_fenced_block(raw: &str) -> Option<FencedBlock<'_>> {
    let (start, body_start) = FENCE_TAGS.iter().find_map(|tag| {
        let marker = format!("```{tag}");
        let mut from = 0;
        while let Some(pos) = raw[from..].find(&marker) {
            let start = from + pos;
            let after = start + marker.len();
            let rest = &raw[after..];
            // The tag must end the opening line
            let line_end = rest.find('\n');
            let tail = &rest[..line_end.unwrap_or(rest.len())];
            if tail.trim().is_empty() {
                return line_end.map(|n| (start, after + n + 1));
            }
            from = after;
        }
        None
    })?;

    let mut offset = body_start;
    for line in raw[body_start..].split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            return Some(FencedBlock {
                start,
                end: offset + line.len(),
                body: &raw[body_start..offset],
            });
        }
        if let Some(before) = trimmed.strip_suffix("```") {
            // Closing fence glued to the last JSON line
            let line_start = offset + (line.len() - line.trim_start().len());
            return Some(FencedBlock {
                start,
                end: offset + line.len(),
                body: &raw[body_start..line_start + before.len()],
            });
        }
        offset += line.len();
    }
    None
}

fn parse_fenced(raw: &str) -> Option<ParsedEnvelope> {
    let block = find_fenced_block(raw)?;
    let body = block.body.trim();
    if body.is_empty() {
        debug!("Empty envelope block, treating reply as plain text");
        return None;
    }

    let obj = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(obj)) => obj,
        Ok(_) => {
            debug!("Envelope block is not a JSON object, treating reply as plain text");
            return None;
        }
        Err(e) => {
            debug!(error = %e, "Malformed envelope JSON, treating reply as plain text");
            return None;
        }
    };

    let mut parsed = parse_object(&obj, EnvelopeForm::Fenced);
    if parsed.assistant_text.trim().is_empty() {
        let mut outside = String::with_capacity(raw.len());
        outside.push_str(&raw[..block.start]);
        outside.push_str(&raw[block.end..]);
        parsed.assistant_text = outside.trim().to_string();
    }
    Some(parsed)
}

fn parse_bare(raw: &str) -> Option<ParsedEnvelope> {
    let trimmed = raw.trim();
    if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
        return None;
    }
    let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(trimmed) else {
        return None;
    };
    if !ENVELOPE_KEYS.iter().any(|k| obj.contains_key(*k)) {
        return None;
    }
    Some(parse_object(&obj, EnvelopeForm::Bare))
}

fn parse_object(obj: &Map<String, Value>, form: EnvelopeForm) -> ParsedEnvelope {
    let mut parsed = ParsedEnvelope {
        assistant_text: obj
            .get("assistant_text")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
        form,
        ..ParsedEnvelope::plain("")
    };

    for item in array(obj, "tool_calls") {
        if let Some(call) = parse_tool_call(item) {
            parsed.tool_calls.push(call);
        }
    }
    for item in array(obj, "skill_calls") {
        if let Some(call) = parse_skill_call(item) {
            parsed.skill_calls.push(call);
        }
    }
    for item in array(obj, "subagent_calls") {
        if let Some(call) = parse_subagent_call(item) {
            parsed.subagent_calls.push(call);
        }
    }

    for item in array(obj, "actions") {
        let Some(fields) = item.as_object() else {
            debug!("Dropping non-object action");
            continue;
        };
        if fields.contains_key("task") {
            parsed.subagent_calls.extend(parse_subagent_call(item));
        } else if fields.contains_key("skill") {
            parsed.skill_calls.extend(parse_skill_call(item));
        } else {
            parsed.tool_calls.extend(parse_tool_call(item));
        }
    }

    match obj.get("warnings") {
        Some(Value::String(w)) if !w.trim().is_empty() => parsed.warnings.push(w.trim().to_string()),
        Some(Value::Array(items)) => parsed.warnings.extend(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .map(String::from),
        ),
        _ => {}
    }

    parsed
}

fn array<'a>(obj: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    obj.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn non_empty_str<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Arguments default to `{}`; anything other than an object is rejected.
fn arguments(fields: &Map<String, Value>) -> Option<Map<String, Value>> {
    match fields.get("arguments") {
        None | Some(Value::Null) => Some(Map::new()),
        Some(Value::Object(args)) => Some(args.clone()),
        Some(_) => None,
    }
}

fn parse_tool_call(item: &Value) -> Option<ToolCall> {
    let fields = item.as_object()?;
    let Some(id) = non_empty_str(fields, "id") else {
        debug!("Dropping tool call without an id");
        return None;
    };
    let name = non_empty_str(fields, "name").or_else(|| non_empty_str(fields, "tool"))?;
    let tool = match ToolName::from_str(name) {
        Ok(tool) => tool,
        Err(e) => {
            debug!(id, error = %e, "Dropping tool call");
            return None;
        }
    };
    let Some(args) = arguments(fields) else {
        debug!(id, tool = %tool, "Dropping tool call with non-object arguments");
        return None;
    };
    match ToolRequest::from_parts(tool, Value::Object(args)) {
        Ok(request) => Some(ToolCall::new(id, request)),
        Err(e) => {
            debug!(id, tool = %tool, error = %e, "Dropping tool call with invalid arguments");
            None
        }
    }
}

fn parse_skill_call(item: &Value) -> Option<SkillCall> {
    let fields = item.as_object()?;
    let id = non_empty_str(fields, "id")?;
    let Some(name) = non_empty_str(fields, "name").or_else(|| non_empty_str(fields, "skill")) else {
        debug!(id, "Dropping skill call without a name");
        return None;
    };
    let Some(arguments) = arguments(fields) else {
        debug!(id, skill = name, "Dropping skill call with non-object arguments");
        return None;
    };
    Some(SkillCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    })
}

fn parse_subagent_call(item: &Value) -> Option<SubagentCall> {
    let fields = item.as_object()?;
    let id = non_empty_str(fields, "id")?;
    let Some(task) = non_empty_str(fields, "task") else {
        debug!(id, "Dropping subagent call without a task");
        return None;
    };

    let context = non_empty_str(fields, "context").map(String::from);

    let allowed_tools = fields
        .get("allowedTools")
        .or_else(|| fields.get("allowed_tools"))
        .and_then(Value::as_array)
        .map(|names| {
            let mut tools: Vec<ToolName> = Vec::with_capacity(names.len());
            for tool in names
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|n| ToolName::from_str(n.trim()).ok())
            {
                if !tools.contains(&tool) {
                    tools.push(tool);
                }
            }
            tools
        });

    let max_rounds = fields
        .get("maxRounds")
        .or_else(|| fields.get("max_rounds"))
        .and_then(Value::as_u64)
        .filter(|n| *n > 0)
        .and_then(|n| u32::try_from(n).ok());

    Some(SubagentCall {
        id: id.to_string(),
        task: task.to_string(),
        context,
        allowed_tools,
        max_rounds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use yips_core::tool::ReadFileArgs;

    fn fenced(json: &str) -> String {
        format!("Working on it.\n```yips-agent\n{json}\n```\n")
    }

    #[test]
    fn plain_text_passes_through() {
        let parsed = parse_envelope("Just an answer.");
        assert_eq!(parsed.form, EnvelopeForm::Plain);
        assert_eq!(parsed.assistant_text, "Just an answer.");
        assert!(!parsed.has_actions());
    }

    #[test]
    fn fenced_tool_call() {
        let raw = fenced(
            r#"{"tool_calls":[{"id":"c1","name":"read_file","arguments":{"path":"src/lib.rs"}}]}"#,
        );
        let parsed = parse_envelope(&raw);

        assert_eq!(parsed.form, EnvelopeForm::Fenced);
        assert_eq!(parsed.assistant_text, "Working on it.");
        assert_eq!(
            parsed.tool_calls,
            vec![ToolCall::new(
                "c1",
                ToolRequest::ReadFile(ReadFileArgs {
                    path: "src/lib.rs".into()
                })
            )]
        );
    }

    #[test]
    fn assistant_text_field_wins_over_surrounding_text() {
        let raw = fenced(r#"{"assistant_text":"  Reading the file. ","tool_calls":[]}"#);
        let parsed = parse_envelope(&raw);
        assert_eq!(parsed.assistant_text, "Reading the file.");
    }

    #[test]
    fn text_after_the_block_is_kept() {
        let raw = "Before.\n```yips-agent\n{\"tool_calls\":[]}\n```\nAfter.";
        assert_eq!(parse_envelope(raw).assistant_text, "Before.\nAfter.");
    }

    #[test]
    fn legacy_tag_is_accepted() {
        let raw = "```yips-tools\n{\"tool_calls\":[{\"id\":\"1\",\"name\":\"list_dir\"}]}\n```";
        let parsed = parse_envelope(raw);
        assert_eq!(parsed.form, EnvelopeForm::Fenced);
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].name(), ToolName::ListDir);
        assert_eq!(parsed.assistant_text, "");
    }

    #[test]
    fn preferred_tag_wins_when_both_present() {
        let raw = "```yips-tools\n{\"tool_calls\":[{\"id\":\"old\",\"name\":\"list_dir\"}]}\n```\n\
                   ```yips-agent\n{\"tool_calls\":[{\"id\":\"new\",\"name\":\"list_dir\"}]}\n```";
        let parsed = parse_envelope(raw);
        assert_eq!(parsed.tool_calls[0].id, "new");
    }

    #[test]
    fn closing_fence_on_the_json_line() {
        let raw = "```yips-agent\n{\"tool_calls\":[{\"id\":\"1\",\"name\":\"grep\",\"arguments\":{\"pattern\":\"fn\"}}]}```";
        let parsed = parse_envelope(raw);
        assert_eq!(parsed.tool_calls.len(), 1);
    }

    #[test]
    fn malformed_json_degrades_to_plain_text() {
        let raw = "```yips-agent\n{\"tool_calls\": [\n```";
        let parsed = parse_envelope(raw);
        assert_eq!(parsed.form, EnvelopeForm::Plain);
        assert_eq!(parsed.assistant_text, raw);
    }

    #[test]
    fn unterminated_block_degrades_to_plain_text() {
        let raw = "```yips-agent\n{\"tool_calls\":[]}\n";
        let parsed = parse_envelope(raw);
        assert_eq!(parsed.form, EnvelopeForm::Plain);
        assert_eq!(parsed.assistant_text, raw);
    }

    #[test]
    fn empty_block_degrades_to_plain_text() {
        let raw = "Hmm.\n```yips-agent\n\n```";
        assert_eq!(parse_envelope(raw).form, EnvelopeForm::Plain);
    }

    #[test]
    fn unknown_tool_is_dropped_individually() {
        let raw = fenced(
            r#"{"tool_calls":[
                {"id":"1","name":"launch_rockets","arguments":{}},
                {"id":"2","name":"read_file","arguments":{"path":"a"}}
            ]}"#,
        );
        let parsed = parse_envelope(&raw);
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].id, "2");
    }

    #[test]
    fn malformed_items_are_skipped() {
        let raw = fenced(
            r#"{"tool_calls":[
                {"name":"read_file","arguments":{"path":"no-id"}},
                {"id":"","name":"read_file","arguments":{"path":"empty-id"}},
                {"id":"a","name":"read_file","arguments":"path=x"},
                {"id":"b","name":"read_file","arguments":{"wrong":"field"}},
                {"id":"c","name":"write_file","arguments":{"path":"x","content":"ok"}},
                "not an object"
            ]}"#,
        );
        let parsed = parse_envelope(&raw);
        let ids: Vec<_> = parsed.tool_calls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c"]);
    }

    #[test]
    fn bare_envelope() {
        let raw = r#"  {"assistant_text":"Listing.","tool_calls":[{"id":"1","name":"list_dir","arguments":{}}]}  "#;
        let parsed = parse_envelope(raw);
        assert_eq!(parsed.form, EnvelopeForm::Bare);
        assert_eq!(parsed.assistant_text, "Listing.");
        assert_eq!(parsed.tool_calls.len(), 1);
    }

    #[test]
    fn bare_envelope_without_text_shows_nothing() {
        let parsed = parse_envelope(r#"{"tool_calls":[{"id":"1","name":"list_dir"}]}"#);
        assert_eq!(parsed.assistant_text, "");
    }

    #[test]
    fn json_without_envelope_keys_is_plain() {
        let raw = r#"{"answer": 42}"#;
        let parsed = parse_envelope(raw);
        assert_eq!(parsed.form, EnvelopeForm::Plain);
        assert_eq!(parsed.assistant_text, raw);
    }

    #[test]
    fn actions_array_routes_by_shape() {
        let raw = r#"{"actions":[
            {"id":"t","name":"read_file","arguments":{"path":"README.md"}},
            {"id":"s","skill":"summarize","arguments":{"length":"short"}},
            {"id":"a","task":"Audit the tests","allowedTools":["grep","read_file","teleport"],"maxRounds":2},
            {"id":"x","name":"nope"}
        ]}"#;
        let parsed = parse_envelope(raw);

        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].id, "t");

        assert_eq!(parsed.skill_calls.len(), 1);
        assert_eq!(parsed.skill_calls[0].name, "summarize");
        assert_eq!(parsed.skill_calls[0].arguments["length"], "short");

        assert_eq!(parsed.subagent_calls.len(), 1);
        let sub = &parsed.subagent_calls[0];
        assert_eq!(sub.task, "Audit the tests");
        assert_eq!(sub.allowed_tools, Some(vec![ToolName::Grep, ToolName::ReadFile]));
        assert_eq!(sub.max_rounds, Some(2));
    }

    #[test]
    fn subagent_field_aliases_and_bad_round_counts() {
        let raw = fenced(
            r#"{"subagent_calls":[
                {"id":"1","task":"a","allowed_tools":["list_dir"],"max_rounds":3,"context":"ctx"},
                {"id":"2","task":"b","maxRounds":0},
                {"id":"3","task":"c","maxRounds":-4},
                {"id":"4","task":"d","maxRounds":"five"},
                {"id":"5"}
            ]}"#,
        );
        let parsed = parse_envelope(&raw);
        let subs = &parsed.subagent_calls;
        assert_eq!(subs.len(), 4);
        assert_eq!(subs[0].allowed_tools, Some(vec![ToolName::ListDir]));
        assert_eq!(subs[0].max_rounds, Some(3));
        assert_eq!(subs[0].context.as_deref(), Some("ctx"));
        assert!(subs[1..].iter().all(|s| s.max_rounds.is_none()));
        assert!(subs.iter().skip(1).all(|s| s.allowed_tools.is_none()));
    }

    #[test]
    fn repeated_allowed_tools_are_listed_once() {
        let raw = fenced(
            r#"{"subagent_calls":[{"id":"1","task":"t","allowedTools":["grep","read_file","grep","read_file"]}]}"#,
        );
        let parsed = parse_envelope(&raw);
        assert_eq!(
            parsed.subagent_calls[0].allowed_tools,
            Some(vec![ToolName::Grep, ToolName::ReadFile])
        );
    }

    #[test]
    fn skill_calls_accept_name_or_skill() {
        let raw = fenced(
            r#"{"skill_calls":[{"id":"1","name":"a"},{"id":"2","skill":"b"},{"id":"3"}]}"#,
        );
        let names: Vec<_> = parse_envelope(&raw)
            .skill_calls
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn warnings_are_collected() {
        let raw = fenced(r#"{"warnings":["low disk", 3, "  "],"tool_calls":[]}"#);
        assert_eq!(parse_envelope(&raw).warnings, vec!["low disk"]);

        let raw = fenced(r#"{"warnings":"single"}"#);
        assert_eq!(parse_envelope(&raw).warnings, vec!["single"]);
    }

    #[test]
    fn tag_must_end_the_opening_line() {
        let raw = "```yips-agentic\n{\"tool_calls\":[{\"id\":\"1\",\"name\":\"list_dir\"}]}\n```";
        assert_eq!(parse_envelope(raw).form, EnvelopeForm::Plain);
    }

    #[test]
    fn edit_file_aliases_are_accepted() {
        let raw = fenced(
            r#"{"tool_calls":[{"id":"1","name":"edit_file","arguments":{"path":"a","old_string":"x","new_string":"y"}}]}"#,
        );
        let parsed = parse_envelope(&raw);
        match &parsed.tool_calls[0].request {
            ToolRequest::EditFile(args) => {
                assert_eq!(args.old_text, "x");
                assert_eq!(args.new_text, "y");
                assert!(!args.replace_all);
            }
            other => panic!("Expected edit_file, got {other:?}"),
        }
    }
}
