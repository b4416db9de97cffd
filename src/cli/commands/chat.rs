//! Interactive editing session.

use super::{build_driver, Progress};
use crate::agent::{is_termination, DriverReply};
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use anyhow::Result;
use console::style;
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Run the interactive chat command.
pub async fn run_chat(settings: &Settings, config_path: Option<&Path>) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Plan, settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'splice doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let progress = Progress::default();
    let mut driver = build_driver(settings, config_path, &progress)?;

    progress.begin("Starting worker...");
    let started = driver.start().await;
    progress.finish();
    started?;

    if let Some(session) = driver.session() {
        println!("\n{}", style("Splice").bold().cyan());
        println!(
            "{}",
            style(format!(
                "{} tools ready. Describe an edit, 'clear' to reset, or 'quit' to leave.",
                session.tools().len()
            ))
            .dim()
        );
        println!("{}\n", style(format!("Outputs go to {}", settings.output_dir().display())).dim());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        driver.await_intent();
        print!("{} ", style("You:").green().bold());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let busy = !line.trim().is_empty() && !is_termination(&line);
        if busy {
            progress.begin("Planning...");
        }
        let reply = driver.handle_input(&line).await;
        progress.finish();

        match reply {
            DriverReply::Response(text) => Output::reply(&text),
            DriverReply::Failure(reason) => Output::error(&reason),
            DriverReply::Cleared => Output::info("Conversation history cleared."),
            DriverReply::Empty => {}
            DriverReply::Terminated => {
                Output::info("Goodbye!");
                break;
            }
        }
    }

    driver.shutdown().await;
    Ok(())
}
