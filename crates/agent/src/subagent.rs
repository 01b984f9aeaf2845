//! Subagent delegation.
//!
//! A subagent call runs the same conductor recursively over an isolated
//! history, narrowed by a [`TurnScope`]. This module prepares that history
//! and scope, and folds the nested outcome back into a [`SubagentResult`].

use tracing::{debug, warn};
use yips_core::action::{SubagentCall, SubagentResult};
use yips_core::agent::{TurnConfig, TurnOutcome};
use yips_core::error::BackendError;
use yips_core::message::{Message, Role, last_assistant_text};
use yips_core::tool::{ActionStatus, ToolName};

use crate::conductor::TurnScope;
use crate::prompt::{protocol_prompt, subagent_prompt};

/// Output used when a sub-turn produced no assistant text at all.
pub const EMPTY_SUBAGENT_OUTPUT: &str = "Subagent finished without producing a response.";

/// A ready-to-run sub-turn.
#[derive(Debug, Clone)]
pub struct SubagentPlan {
    pub scope: TurnScope,
    pub history: Vec<Message>,
}

/// Prepare the sub-turn for `call`, issued from `parent_depth`.
///
/// Fails with a finished error result when the nesting limit is reached.
pub fn plan(call: &SubagentCall, parent_depth: u32, config: &TurnConfig) -> Result<SubagentPlan, SubagentResult> {
    let depth = parent_depth + 1;
    if depth > config.max_subagent_depth {
        warn!(call_id = %call.id, depth, limit = config.max_subagent_depth, "Subagent nesting limit reached");
        return Err(SubagentResult::new(
            call,
            ActionStatus::Error,
            format!(
                "Subagent nesting limit reached: delegation is allowed at most {} level(s) deep.",
                config.max_subagent_depth
            ),
        ));
    }

    let max_rounds = call.max_rounds.unwrap_or(config.subagent_max_rounds);
    let tools: Vec<ToolName> = call
        .allowed_tools
        .clone()
        .unwrap_or_else(|| ToolName::ALL.to_vec());
    let can_nest = depth < config.max_subagent_depth;

    let system = format!(
        "{}\n{}",
        protocol_prompt(&tools, can_nest),
        subagent_prompt(call, max_rounds)
    );

    debug!(call_id = %call.id, depth, max_rounds, "Delegating to subagent");
    Ok(SubagentPlan {
        scope: TurnScope {
            allowed_tools: call.allowed_tools.clone(),
            max_rounds,
            depth,
            stream: false,
            include_project_context: false,
        },
        history: vec![Message::system(system), Message::user(call.task.clone())],
    })
}

/// Fold a settled sub-turn into the parent's result.
pub fn finish(
    call: &SubagentCall,
    outcome: Result<TurnOutcome, BackendError>,
    history: &[Message],
) -> SubagentResult {
    match outcome {
        Ok(outcome) => {
            let output = last_assistant_text(history)
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .unwrap_or(EMPTY_SUBAGENT_OUTPUT);
            let status = if outcome.finished {
                ActionStatus::Ok
            } else {
                ActionStatus::Timeout
            };
            SubagentResult::new(call, status, output)
                .with_rounds(outcome.rounds)
                .with_metadata("rounds", outcome.rounds.to_string())
        }
        Err(e) => {
            warn!(call_id = %call.id, error = %e, "Subagent failed");
            // One assistant message per completed round
            let rounds = history.iter().filter(|m| m.role == Role::Assistant).count() as u32;
            SubagentResult::new(call, ActionStatus::Error, e.to_string())
                .with_rounds(rounds)
                .with_metadata("rounds", rounds.to_string())
        }
    }
}
