//! Assistant backend implementations for Yips.
//!
//! All backends implement the `yips_core::AssistantBackend` trait. Local
//! inference servers (llama.cpp, Ollama, vLLM) and hosted APIs are reached
//! through the same OpenAI-compatible adapter.

pub mod openai_compat;
pub mod sse;

pub use openai_compat::{ChunkSink, OpenAiCompatBackend};
