//! Incremental parser for OpenAI-style server-sent events.
//!
//! Bytes arrive in arbitrary chunks; complete `data:` lines are decoded
//! into [`SseEvent`]s and partial lines stay buffered as raw bytes, so a
//! multi-byte character split across chunks survives.

use serde::Deserialize;
use tracing::trace;

/// One decoded event from a chat-completions stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A content fragment
    Delta(String),
    /// Token usage, sent at the end when `include_usage` was requested
    Usage {
        completion_tokens: u64,
        total_tokens: u64,
    },
    /// The `[DONE]` sentinel
    Done,
}

/// Line-buffering SSE decoder.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns the events completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&line);
            events.extend(parse_line(line.trim_end_matches(['\r', '\n'])));
        }
        events
    }

    /// Flush a trailing line that was never newline-terminated.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = String::from_utf8_lossy(&rest);
        parse_line(rest.trim_end_matches(['\r', '\n']))
    }
}

fn parse_line(line: &str) -> Vec<SseEvent> {
    // Blank lines separate events; lines starting with ':' are comments
    if line.is_empty() || line.starts_with(':') {
        return Vec::new();
    }
    let Some(data) = line.strip_prefix("data:") else {
        return Vec::new();
    };
    let data = data.trim();
    if data == "[DONE]" {
        return vec![SseEvent::Done];
    }

    let chunk: StreamResponse = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
            return Vec::new();
        }
    };

    let mut events = Vec::new();
    if let Some(content) = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|c| !c.is_empty())
    {
        events.push(SseEvent::Delta(content));
    }
    if let Some(usage) = chunk.usage {
        events.push(SseEvent::Usage {
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        });
    }
    events
}

// --- Streaming SSE types ---

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<StreamUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamUsage {
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}
