//! Built-in tools for Yips.
//!
//! The eight tools the agent can call: file reads, writes and edits,
//! directory listings, regex search, shell commands, and the two-phase
//! staged write (`preview_write_file` / `apply_file_change`).
//! [`WorkspaceToolExecutor`] dispatches typed calls to them and turns every
//! failure into a result.

pub mod diff;
pub mod executor;
pub mod file_read;
pub mod file_write;
pub mod search;
pub mod shell;
pub mod staged;

pub use executor::{PostWriteHook, WorkspaceToolExecutor};
pub use staged::{
    AppliedChange, ApplyError, Clock, ManualClock, StagedChange, StagedChangeStore, StagedPreview,
    SystemClock,
};
