//! `yips chat`: interactive session.

use std::io::Write;
use std::sync::Arc;
use yips_config::AppConfig;
use yips_core::message::Message;

use crate::session::{Session, interactive_approver};
use crate::terminal::{StdoutSink, TerminalObserver, format_outcome, read_line};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let approver = interactive_approver(config.approval.mode);
    let session = Session::build(&config, approver, Some(Arc::new(StdoutSink)))?;

    println!();
    println!("  Yips: interactive session");
    println!();
    println!("  Backend:    {}", config.backend.base_url);
    println!("  Model:      {}", config.backend.model);
    println!("  Workspace:  {}", session.root.display());
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type '/clear' to start over, 'exit' or Ctrl+D to quit.");
    println!();

    match session.backend.health_check().await {
        Ok(true) => {}
        Ok(false) => eprintln!("[warning] Backend at {} reports unhealthy", config.backend.base_url),
        Err(e) => eprintln!("[warning] Backend at {} is not reachable: {e}", config.backend.base_url),
    }

    let mut history = session.new_history();

    loop {
        print!("You > ");
        std::io::stdout().flush()?;

        let Some(line) = read_line().await? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "exit" | "quit" => break,
            "/clear" => {
                history = session.new_history();
                println!("  History cleared.");
                continue;
            }
            _ => {}
        }

        history.push(Message::user(input));
        println!();
        match session.conductor.run_turn(&mut history, &TerminalObserver).await {
            Ok(outcome) => eprintln!("{}", format_outcome(&outcome)),
            Err(e) => eprintln!("Request failed: {e}"),
        }
        println!();
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}
