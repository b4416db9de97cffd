//! Call command: invoke one tool without the planner.

use crate::agent::{Connector, WorkerConnector};
use crate::bridge::Outcome;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use anyhow::{anyhow, Result};
use serde_json::{Map, Value};
use std::path::Path;

/// Invoke `tool` with `key=value` arguments.
pub async fn run_call(
    tool: &str,
    args: &[String],
    settings: &Settings,
    config_path: Option<&Path>,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Call, settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'splice doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let arguments = parse_arguments(args)?;
    let connector = WorkerConnector::from_settings(settings, config_path)?;

    let spinner = Output::spinner(&format!("Running {}...", tool));
    let result = match connector.connect().await {
        Ok(session) => {
            let result = session.proxies().invoke(tool, &arguments).await;
            session.close().await;
            result
        }
        Err(e) => Err(e),
    };
    spinner.finish_and_clear();

    match result? {
        Outcome::Success(location) => {
            Output::success(&format!("{} wrote {}", tool, location));
            Ok(())
        }
        Outcome::Failure(reason) => {
            Output::error(&reason);
            Err(anyhow!("{} failed", tool))
        }
    }
}

/// Turn `key=value` pairs into an argument object.
///
/// Values that read as a JSON number or boolean keep that type; everything
/// else is a string.
fn parse_arguments(args: &[String]) -> Result<Value> {
    let mut map = Map::new();
    for arg in args {
        let (key, raw) = arg
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got '{}'", arg))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(anyhow!("empty argument name in '{}'", arg));
        }
        let value = match serde_json::from_str::<Value>(raw) {
            Ok(v @ (Value::Number(_) | Value::Bool(_))) => v,
            _ => Value::String(raw.to_string()),
        };
        map.insert(key.to_string(), value);
    }
    Ok(Value::Object(map))
}
