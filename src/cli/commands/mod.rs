//! CLI command implementations.

mod call;
mod chat;
mod config;
mod doctor;
mod run;
mod tools;
mod worker;

pub use call::run_call;
pub use chat::run_chat;
pub use config::run_config;
pub use doctor::run_doctor;
pub use run::run_intent;
pub use tools::run_tools;
pub use worker::run_worker;

use crate::agent::{Driver, DriverEvent, DriverOptions, OpenAIPlanner, WorkerConnector};
use crate::cli::{truncate, Output};
use crate::config::Settings;
use crate::error::Result;
use indicatif::ProgressBar;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Spinner shared between the command loop and the driver observer.
#[derive(Clone, Default)]
struct Progress {
    current: Arc<Mutex<Option<ProgressBar>>>,
}

impl Progress {
    fn begin(&self, msg: &str) {
        if let Ok(mut current) = self.current.lock() {
            if let Some(previous) = current.take() {
                previous.finish_and_clear();
            }
            *current = Some(Output::spinner(msg));
        }
    }

    fn finish(&self) {
        if let Ok(mut current) = self.current.lock() {
            if let Some(pb) = current.take() {
                pb.finish_and_clear();
            }
        }
    }

    fn with_bar(&self, f: impl FnOnce(Option<&ProgressBar>)) {
        if let Ok(current) = self.current.lock() {
            f(current.as_ref());
        }
    }

    fn on_event(&self, event: DriverEvent<'_>) {
        self.with_bar(|pb| match event {
            DriverEvent::Planning => {
                if let Some(pb) = pb {
                    pb.set_message("Planning...");
                }
            }
            DriverEvent::ToolStarted(selection) => {
                if let Some(pb) = pb {
                    pb.set_message(format!("Running {}...", selection.tool_name));
                }
            }
            DriverEvent::ToolFinished(selection, outcome) => {
                let call = truncate(&selection.to_string(), 60);
                let print = || Output::tool_line(&call, outcome.is_success(), outcome.text());
                match pb {
                    Some(pb) => pb.suspend(print),
                    None => print(),
                }
            }
            DriverEvent::Reconnecting(attempt) => {
                let print = || Output::warning(&format!("Worker lost, reconnecting (attempt {})", attempt));
                match pb {
                    Some(pb) => pb.suspend(print),
                    None => print(),
                }
            }
        });
    }
}

/// Planner, worker connector and driver wired up from settings.
fn build_driver(settings: &Settings, config_path: Option<&Path>, progress: &Progress) -> Result<Driver> {
    let planner = OpenAIPlanner::new(&settings.planner)?;
    let connector = WorkerConnector::from_settings(settings, config_path)?;
    let observer = progress.clone();
    Ok(Driver::new(
        Box::new(planner),
        Box::new(connector),
        DriverOptions::from(settings),
    )
    .with_observer(move |event| observer.on_event(event)))
}
