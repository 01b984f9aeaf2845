//! # Yips Core
//!
//! Domain types, traits, and error definitions for the Yips local agent.
//! This crate has **no framework dependencies**. It defines the domain
//! model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the agent loop is a trait here: the assistant
//! backend, the tool and skill executors, the token estimator and the turn
//! observer. Implementations live in their respective crates, and tests
//! swap in scripted stand-ins.

pub mod action;
pub mod agent;
pub mod backend;
pub mod error;
pub mod estimate;
pub mod event;
pub mod message;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use action::{SkillCall, SkillExecutor, SkillResult, SubagentCall, SubagentResult};
pub use agent::{TurnConfig, TurnOutcome};
pub use backend::{AssistantBackend, AssistantReply, AssistantRequest};
pub use error::{BackendError, Error, Result, ToolError};
pub use estimate::{CharRatioEstimator, TokenEstimator};
pub use event::{NoopObserver, RecordingObserver, TurnEvent, TurnObserver};
pub use message::{Message, Role};
pub use tool::{ActionStatus, ToolCall, ToolExecutor, ToolName, ToolRequest, ToolResult};
