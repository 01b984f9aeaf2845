//! System prompts: the action protocol and the delegated-scope preamble.

use yips_core::action::SubagentCall;
use yips_core::tool::ToolName;

/// Describe the envelope protocol and the available tools.
///
/// Hosts put this at the head of a fresh history. `subagents` controls
/// whether delegation is advertised.
pub fn protocol_prompt(tools: &[ToolName], subagents: bool) -> String {
    let mut prompt = String::from(
        "You are Yips, a coding agent working inside the user's workspace.\n\
         To act, reply with a fenced block tagged yips-agent holding one JSON object:\n\n\
         ```yips-agent\n\
         {\"assistant_text\": \"what you tell the user\", \"tool_calls\": [{\"id\": \"1\", \"name\": \"read_file\", \"arguments\": {\"path\": \"README.md\"}}]}\n\
         ```\n\n\
         Results come back in a system message. When you are done, reply with plain text and no block.\n\n\
         Tools:\n",
    );
    for tool in tools {
        prompt.push_str("- ");
        prompt.push_str(tool.usage());
        prompt.push('\n');
    }
    prompt.push_str(
        "\nTo change a file safely, call preview_write_file, check the diff, then apply_file_change with the returned token.\n",
    );
    if subagents {
        prompt.push_str(
            "To delegate a self-contained task, add \"subagent_calls\": [{\"id\": \"s1\", \"task\": \"...\", \
             \"context\": \"...\", \"allowedTools\": [\"read_file\"], \"maxRounds\": 3}].\n",
        );
    }
    prompt
}

/// The system message that opens a subagent's isolated history.
pub fn subagent_prompt(call: &SubagentCall, max_rounds: u32) -> String {
    let tools = match &call.allowed_tools {
        Some(tools) if tools.is_empty() => "none".to_string(),
        Some(tools) => tools.iter().map(ToolName::as_str).collect::<Vec<_>>().join(", "),
        None => "all tools".to_string(),
    };

    let mut prompt = format!(
        "You are a subagent handling one delegated task.\n\
         Task: {}\n",
        call.task
    );
    if let Some(context) = &call.context {
        prompt.push_str(&format!("Context: {context}\n"));
    }
    prompt.push_str(&format!(
        "Allowed tools: {tools}\n\
         You have at most {max_rounds} rounds. Stay within this scope and finish with a concise final report \
         as plain text.\n"
    ));
    prompt
}
