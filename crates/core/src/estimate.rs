//! Token and throughput estimation strategies.
//!
//! The agent loop never counts tokens itself; hosts inject an estimator.

use crate::message::Message;

/// Pluggable token accounting.
pub trait TokenEstimator: Send + Sync {
    /// Estimate the token count of one completion.
    fn estimate_completion_tokens(&self, text: &str) -> u64;

    /// Estimate the token count of a whole history.
    fn estimate_history_tokens(&self, history: &[Message]) -> u64;

    /// Output throughput, or `None` if it cannot be computed.
    fn tokens_per_second(&self, tokens: u64, duration_ms: u64) -> Option<f64>;
}

/// Character-ratio heuristic (4 chars ≈ 1 token).
#[derive(Debug, Clone, Copy)]
pub struct CharRatioEstimator {
    pub chars_per_token: usize,
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self { chars_per_token: 4 }
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate_completion_tokens(&self, text: &str) -> u64 {
        let ratio = self.chars_per_token.max(1);
        text.chars().count().div_ceil(ratio) as u64
    }

    fn estimate_history_tokens(&self, history: &[Message]) -> u64 {
        history
            .iter()
            .map(|m| self.estimate_completion_tokens(&m.content))
            .sum()
    }

    fn tokens_per_second(&self, tokens: u64, duration_ms: u64) -> Option<f64> {
        if duration_ms == 0 || tokens == 0 {
            return None;
        }
        Some(tokens as f64 * 1000.0 / duration_ms as f64)
    }
}
