//! One-shot editing request.

use super::{build_driver, Progress};
use crate::agent::DriverReply;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use anyhow::Result;
use std::path::Path;

/// Carry out `intent` and print the answer.
pub async fn run_intent(intent: &str, settings: &Settings, config_path: Option<&Path>) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Plan, settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'splice doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let progress = Progress::default();
    let mut driver = build_driver(settings, config_path, &progress)?;

    progress.begin("Starting worker...");
    if let Err(e) = driver.start().await {
        progress.finish();
        return Err(e.into());
    }

    progress.begin("Planning...");
    let reply = driver.handle_input(intent).await;
    progress.finish();
    driver.shutdown().await;

    match reply {
        DriverReply::Response(text) => {
            Output::reply(&text);
            Ok(())
        }
        DriverReply::Failure(reason) => {
            Output::error(&reason);
            anyhow::bail!("request failed: {}", reason)
        }
        DriverReply::Cleared | DriverReply::Empty | DriverReply::Terminated => Ok(()),
    }
}
