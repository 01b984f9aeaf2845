//! OpenAI-compatible assistant backend.
//!
//! Works with: llama.cpp server, Ollama, vLLM, LM Studio, OpenAI, and any
//! endpoint exposing `/v1/chat/completions`.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Optional project context injected as a leading system message
//! - Health checks against `/models`

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use yips_config::BackendConfig;
use yips_core::backend::{AssistantBackend, AssistantReply, AssistantRequest};
use yips_core::error::BackendError;
use yips_core::message::Message;

use crate::sse::{SseEvent, SseParser};

/// Receives reply text while it streams in.
pub trait ChunkSink: Send + Sync {
    fn on_chunk(&self, text: &str);

    /// Called once after the last chunk of a reply.
    fn on_finish(&self) {}
}

/// An OpenAI-compatible assistant backend.
pub struct OpenAiCompatBackend {
    name: String,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
    project_context: Option<String>,
    chunk_sink: Option<Arc<dyn ChunkSink>>,
}

impl std::fmt::Debug for OpenAiCompatBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatBackend")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("has_api_key", &self.api_key.is_some())
            .field("has_project_context", &self.project_context.is_some())
            .field("streams", &self.chunk_sink.is_some())
            .finish()
    }
}

impl OpenAiCompatBackend {
    /// Create a backend for `base_url` (e.g. `http://127.0.0.1:8080/v1`).
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::NotConfigured(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            name: "openai-compat".into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            temperature: 0.2,
            max_tokens: 2048,
            client,
            project_context: None,
            chunk_sink: None,
        })
    }

    /// Create a backend from the `[backend]` config section.
    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        if config.base_url.trim().is_empty() {
            return Err(BackendError::NotConfigured("backend.base_url is empty".into()));
        }
        let mut backend = Self::new(
            &config.base_url,
            &config.model,
            Duration::from_secs(config.timeout_secs),
        )?
        .with_sampling(config.temperature, config.max_tokens);
        backend.api_key = config.api_key.clone().filter(|k| !k.is_empty());
        Ok(backend)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Text injected as a system message into requests that ask for
    /// project context. Blank text is ignored.
    pub fn with_project_context(mut self, context: Option<String>) -> Self {
        self.project_context = context.filter(|c| !c.trim().is_empty());
        self
    }

    /// Stream replies to `sink` whenever a request allows streaming.
    pub fn with_chunk_sink(mut self, sink: Arc<dyn ChunkSink>) -> Self {
        self.chunk_sink = Some(sink);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The messages actually sent: the history, preceded by the project
    /// context when requested. The caller's history is never touched.
    fn outgoing_messages(&self, request: &AssistantRequest) -> Vec<ApiMessage> {
        let context = self
            .project_context
            .as_deref()
            .filter(|_| request.include_project_context)
            .map(|ctx| ApiMessage {
                role: "system".into(),
                content: format!("Project context:\n{ctx}"),
            });

        context
            .into_iter()
            .chain(request.messages.iter().map(ApiMessage::from))
            .collect()
    }

    fn request_body(&self, request: &AssistantRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": self.outgoing_messages(request),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": stream,
        });
        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }
        body
    }

    async fn post(&self, body: &serde_json::Value, stream: bool) -> Result<reqwest::Response, BackendError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        if stream {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = builder.send().await.map_err(map_send_error)?;
        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(backend = %self.name, status, body = %error_body, "Backend returned error");
            return Err(map_status(status, error_body));
        }
        Ok(response)
    }

    async fn complete(&self, request: &AssistantRequest) -> Result<AssistantReply, BackendError> {
        let started = Instant::now();
        let response = self.post(&self.request_body(request, false), false).await?;

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::InvalidResponse("No choices in response".into()))?;

        Ok(AssistantReply {
            text: choice.message.content.unwrap_or_default(),
            rendered: false,
            total_tokens: api_response.usage.as_ref().map(|u| u.total_tokens),
            completion_tokens: api_response.usage.as_ref().map(|u| u.completion_tokens),
            generation_duration_ms: Some(started.elapsed().as_millis() as u64),
        })
    }

    async fn complete_streaming(
        &self,
        request: &AssistantRequest,
        sink: &dyn ChunkSink,
    ) -> Result<AssistantReply, BackendError> {
        let started = Instant::now();
        let response = self.post(&self.request_body(request, true), true).await?;

        let mut reply = AssistantReply {
            rendered: true,
            ..AssistantReply::default()
        };
        let mut parser = SseParser::new();
        let mut byte_stream = response.bytes_stream();

        'stream: while let Some(chunk) = byte_stream.next().await {
            let bytes = chunk.map_err(|e| BackendError::Network(format!("Stream interrupted: {e}")))?;
            for event in parser.push(&bytes) {
                if apply_event(&mut reply, event, sink) {
                    break 'stream;
                }
            }
        }
        for event in parser.finish() {
            apply_event(&mut reply, event, sink);
        }
        sink.on_finish();

        reply.generation_duration_ms = Some(started.elapsed().as_millis() as u64);
        Ok(reply)
    }
}

/// Fold one stream event into the reply. Returns true at `[DONE]`.
fn apply_event(reply: &mut AssistantReply, event: SseEvent, sink: &dyn ChunkSink) -> bool {
    match event {
        SseEvent::Delta(text) => {
            sink.on_chunk(&text);
            reply.text.push_str(&text);
            false
        }
        SseEvent::Usage {
            completion_tokens,
            total_tokens,
        } => {
            reply.completion_tokens = Some(completion_tokens);
            reply.total_tokens = Some(total_tokens);
            false
        }
        SseEvent::Done => true,
    }
}

fn map_send_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout(e.to_string())
    } else if e.is_connect() {
        BackendError::Unavailable(e.to_string())
    } else {
        BackendError::Network(e.to_string())
    }
}

fn map_status(status: u16, body: String) -> BackendError {
    match status {
        401 | 403 => BackendError::Api {
            status_code: status,
            message: "Invalid API key or insufficient permissions".into(),
        },
        503 => BackendError::Unavailable(if body.is_empty() {
            "Backend is not ready (503)".into()
        } else {
            body
        }),
        _ => BackendError::Api {
            status_code: status,
            message: body,
        },
    }
}

#[async_trait]
impl AssistantBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn request(&self, request: AssistantRequest) -> Result<AssistantReply, BackendError> {
        debug!(
            backend = %self.name,
            model = %self.model,
            messages = request.messages.len(),
            stream = request.stream,
            "Sending chat request"
        );

        match (&self.chunk_sink, request.stream) {
            (Some(sink), true) => self.complete_streaming(&request, sink.as_ref()).await,
            _ => self.complete(&request).await,
        }
    }

    async fn health_check(&self) -> Result<bool, BackendError> {
        let url = format!("{}/models", self.base_url);
        let mut builder = self.client.get(&url);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        let response = builder.send().await.map_err(map_send_error)?;
        Ok(response.status().is_success())
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

impl From<&Message> for ApiMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.as_str().into(),
            content: message.content.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}
