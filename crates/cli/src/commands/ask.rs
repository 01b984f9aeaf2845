//! `yips ask`: run one turn and exit.

use std::sync::Arc;
use yips_config::AppConfig;
use yips_core::message::Message;

use crate::session::{Session, headless_approver};
use crate::terminal::{StdoutSink, TerminalObserver};

pub async fn run(message: String, yes: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let approver = headless_approver(config.approval.mode, yes);
    let session = Session::build(&config, approver, Some(Arc::new(StdoutSink)))?;

    let mut history = session.new_history();
    history.push(Message::user(message));

    match session.conductor.run_turn(&mut history, &TerminalObserver).await {
        // A round-limit stop has already been reported as a warning
        Ok(outcome) => {
            tracing::debug!(finished = outcome.finished, rounds = outcome.rounds, "Turn finished");
            Ok(())
        }
        Err(e) => {
            eprintln!("Request failed: {e}");
            std::process::exit(1);
        }
    }
}
