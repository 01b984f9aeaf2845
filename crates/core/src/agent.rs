//! Turn configuration and outcome types.

use serde::{Deserialize, Serialize};

/// Limits and knobs for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Maximum rounds per top-level turn (safety limit)
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Round budget of a subagent call that does not specify one
    #[serde(default = "default_subagent_max_rounds")]
    pub subagent_max_rounds: u32,

    /// Maximum subagent nesting depth (top level is depth 0)
    #[serde(default = "default_max_subagent_depth")]
    pub max_subagent_depth: u32,

    /// Consecutive all-failure rounds before the model is told to pivot
    #[serde(default = "default_failure_pivot_threshold")]
    pub failure_pivot_threshold: u32,

    /// Per-result output cap inside result summaries (chars)
    #[serde(default = "default_summary_output_limit")]
    pub summary_output_limit: usize,
}

fn default_max_rounds() -> u32 {
    6
}
fn default_subagent_max_rounds() -> u32 {
    4
}
fn default_max_subagent_depth() -> u32 {
    2
}
fn default_failure_pivot_threshold() -> u32 {
    2
}
fn default_summary_output_limit() -> usize {
    4000
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            subagent_max_rounds: default_subagent_max_rounds(),
            max_subagent_depth: default_max_subagent_depth(),
            failure_pivot_threshold: default_failure_pivot_threshold(),
            summary_output_limit: default_summary_output_limit(),
        }
    }
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    /// True if the model produced a reply without actions
    pub finished: bool,

    /// Rounds used
    pub rounds: u32,

    /// Total tokens as reported by the backend for the latest reply
    pub used_tokens_exact: Option<u64>,

    /// Output throughput of the latest reply
    pub latest_output_tokens_per_second: Option<f64>,

    /// Estimator's view of the history size after the turn
    pub estimated_history_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let config = TurnConfig::default();
        assert_eq!(config.max_rounds, 6);
        assert_eq!(config.subagent_max_rounds, 4);
        assert_eq!(config.max_subagent_depth, 2);
        assert_eq!(config.failure_pivot_threshold, 2);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: TurnConfig = serde_json::from_str(r#"{"max_rounds": 3}"#).unwrap();
        assert_eq!(config.max_rounds, 3);
        assert_eq!(config.subagent_max_rounds, 4);
    }
}
