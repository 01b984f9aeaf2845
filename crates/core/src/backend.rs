//! Assistant backend trait: the abstraction over the language model.
//!
//! A backend takes the current history and returns one assistant reply.
//! Implementations: OpenAI-compatible HTTP endpoints (llama.cpp server,
//! Ollama, OpenAI), scripted mocks in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::message::Message;

/// One request for an assistant reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantRequest {
    /// The conversation so far
    pub messages: Vec<Message>,

    /// Whether the backend may render the reply incrementally
    #[serde(default)]
    pub stream: bool,

    /// Whether ambient project context should be injected
    #[serde(default)]
    pub include_project_context: bool,
}

impl AssistantRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            stream: false,
            include_project_context: false,
        }
    }
}

/// A complete assistant reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantReply {
    /// Raw reply text (may contain an action envelope)
    pub text: String,

    /// True if the text was already shown to the user while streaming
    #[serde(default)]
    pub rendered: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_duration_ms: Option<u64>,
}

impl AssistantReply {
    /// A plain, non-rendered reply without usage figures.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// The core backend trait.
///
/// Backend failures propagate out of the turn uncaught; the agent loop
/// does not retry.
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    /// A human-readable name for this backend (e.g., "llama.cpp").
    fn name(&self) -> &str;

    /// Request one assistant reply.
    async fn request(&self, request: AssistantRequest) -> Result<AssistantReply, BackendError>;

    /// Health check: can we reach the backend?
    async fn health_check(&self) -> Result<bool, BackendError> {
        Ok(true)
    }
}
