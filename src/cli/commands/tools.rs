//! Tools command: list what the worker advertises.

use crate::agent::{Connector, WorkerConnector};
use crate::bridge::ToolDescriptor;
use crate::cli::Output;
use crate::config::Settings;
use anyhow::Result;
use console::style;
use std::path::Path;

/// Connect to the worker, discover its tools and print them.
pub async fn run_tools(settings: &Settings, config_path: Option<&Path>) -> Result<()> {
    let connector = WorkerConnector::from_settings(settings, config_path)?;

    let spinner = Output::spinner("Discovering tools...");
    let session = connector.connect().await;
    spinner.finish_and_clear();
    let session = session?;

    Output::header(&format!("Tools ({})", session.tools().len()));
    for tool in session.tools() {
        print_tool(tool);
    }
    println!();

    session.close().await;
    Ok(())
}

fn print_tool(tool: &ToolDescriptor) {
    println!("\n  {} {}", style(&tool.name).bold(), style(&tool.description).dim());
    for param in &tool.parameter_schema {
        let detail = match (&param.default, param.required) {
            (_, true) => "required".to_string(),
            (Some(default), false) => format!("default {}", default),
            (None, false) => "optional".to_string(),
        };
        println!(
            "    {} {} ({}) {}",
            style("-").cyan(),
            param.name,
            param.kind,
            style(detail).dim()
        );
    }
}
