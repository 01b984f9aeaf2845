//! The Yips agent loop.
//!
//! A turn follows a **Request → Parse → Act → Report** cycle:
//!
//! 1. **Request** one assistant reply over the current history
//! 2. **Parse** the reply's action envelope (fenced or bare JSON)
//! 3. **Act**: tool calls pass the Risk Gate and the approver before they
//!    run; skill and subagent calls follow
//! 4. **Report** results back as system messages, then loop to step 1
//!
//! The loop ends when a reply requests nothing or the round budget is
//! spent. Subagents run the same loop recursively in a narrower scope.

pub mod conductor;
pub mod envelope;
pub mod prompt;
pub mod subagent;
pub mod summary;

#[cfg(test)]
mod test_helpers;

pub use conductor::{TurnConductor, TurnScope};
pub use envelope::{EnvelopeForm, ParsedEnvelope, parse_envelope};
pub use prompt::{protocol_prompt, subagent_prompt};
