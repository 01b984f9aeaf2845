//! Turn events: what a running turn tells its host.
//!
//! The agent loop reports through a single [`TurnObserver`].

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Everything a turn reports while it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Visible assistant text for one round. Emitted exactly once per round.
    AssistantText {
        text: String,
        /// True if the backend already rendered it while streaming
        rendered: bool,
        /// Subagent nesting depth (0 = top level)
        depth: u32,
    },

    /// A non-fatal, purely observational warning.
    Warning { message: String, depth: u32 },

    /// A round finished (its results, if any, are in the history).
    RoundComplete { round: u32, depth: u32 },
}

impl TurnEvent {
    pub fn depth(&self) -> u32 {
        match self {
            Self::AssistantText { depth, .. }
            | Self::Warning { depth, .. }
            | Self::RoundComplete { depth, .. } => *depth,
        }
    }
}

/// Receives turn events.
pub trait TurnObserver: Send + Sync {
    fn on_event(&self, event: &TurnEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TurnObserver for NoopObserver {
    fn on_event(&self, _event: &TurnEvent) {}
}

/// Collects events in memory. Handy for tests and transcripts.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<TurnEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TurnEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// All warning messages, in order.
    pub fn warnings(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TurnEvent::Warning { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    /// All assistant texts, in order.
    pub fn assistant_texts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TurnEvent::AssistantText { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }
}

impl TurnObserver for RecordingObserver {
    fn on_event(&self, event: &TurnEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
