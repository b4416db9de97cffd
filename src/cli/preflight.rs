//! Pre-flight checks before starting a session.
//!
//! Catches a missing API key or media tool up front instead of failing on
//! the first planning step or the first tool call.

use crate::config::Settings;
use crate::error::{Result, SpliceError};
use std::path::Path;
use std::process::Command;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Planning needs the planner API and the media tools.
    Plan,
    /// Calling tools directly needs only the media tools.
    Call,
}

/// Run pre-flight checks for the given operation.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    if matches!(operation, Operation::Plan) {
        check_api_key(settings)?;
    }
    // A custom worker brings its own tools.
    if settings.worker.command.is_none() {
        check_tool(&Settings::expand_path(&settings.engine.ffmpeg_path))?;
    }
    Ok(())
}

/// Check if an OpenAI API key is configured.
///
/// Skipped for a custom API base; local servers usually need no key.
fn check_api_key(settings: &Settings) -> Result<()> {
    if settings.planner.api_base.is_some() {
        return Ok(());
    }
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(()),
        Ok(_) => Err(SpliceError::Config(
            "OPENAI_API_KEY is empty. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
        Err(_) => Err(SpliceError::Config(
            "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
    }
}

/// `-version` for the ffmpeg family, `--version` for everything else.
pub fn version_arg(program: &Path) -> &'static str {
    let name = program
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    match name {
        "ffmpeg" | "ffprobe" => "-version",
        _ => "--version",
    }
}

/// Check if an external tool is available.
pub fn check_tool(program: &Path) -> Result<()> {
    let name = program.display().to_string();
    match Command::new(program).arg(version_arg(program)).output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(SpliceError::ToolNotFound(format!(
            "{} is installed but not working correctly",
            name
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(SpliceError::ToolNotFound(name)),
        Err(e) => Err(SpliceError::ToolNotFound(format!("{}: {}", name, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_arg() {
        assert_eq!(version_arg(Path::new("ffmpeg")), "-version");
        assert_eq!(version_arg(Path::new("/usr/bin/ffprobe")), "-version");
        assert_eq!(version_arg(Path::new("yt-dlp")), "--version");
    }

    #[test]
    fn test_missing_tool() {
        let err = check_tool(Path::new("splice-definitely-not-installed")).unwrap_err();
        assert!(matches!(err, SpliceError::ToolNotFound(_)));
    }

    #[test]
    fn test_custom_api_base_skips_key_and_custom_worker_skips_tools() {
        let mut settings = Settings::default();
        settings.planner.api_base = Some("http://localhost:11434/v1".to_string());
        settings.worker.command = Some("/opt/worker".to_string());
        assert!(check(Operation::Plan, &settings).is_ok());
    }
}
