//! Doctor command - verify system requirements and configuration.

use crate::cli::preflight::version_arg;
use crate::cli::Output;
use crate::config::Settings;
use anyhow::Result;
use console::style;
use std::path::Path;
use std::process::Command;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

/// Run all diagnostic checks.
pub fn run_doctor(settings: &Settings, config_path: Option<&Path>) -> Result<()> {
    Output::header("Splice Doctor");
    println!();
    println!("Checking system requirements and configuration...\n");

    let mut checks = Vec::new();

    section("Media Tools", &mut checks, media_checks(settings));
    section("Worker", &mut checks, vec![check_worker(settings)]);
    section("Planner", &mut checks, vec![check_api_key(settings)]);
    section("Directories", &mut checks, check_directories(settings));
    section("Configuration", &mut checks, vec![check_config_file(config_path)]);

    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before using Splice.",
            errors
        ));
        anyhow::bail!("{} check(s) failed", errors);
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {} warning(s).", warnings));
    } else {
        Output::success("All checks passed! Splice is ready to use.");
    }

    Ok(())
}

fn section(title: &str, all: &mut Vec<CheckResult>, results: Vec<CheckResult>) {
    println!("{}", style(title).bold());
    for check in &results {
        check.print();
    }
    println!();
    all.extend(results);
}

fn media_checks(settings: &Settings) -> Vec<CheckResult> {
    let engine = &settings.engine;
    vec![
        check_tool("ffmpeg", &Settings::expand_path(&engine.ffmpeg_path), install_hint_ffmpeg(), true),
        check_tool("ffprobe", &Settings::expand_path(&engine.ffprobe_path), install_hint_ffmpeg(), false),
        // Only download_video needs yt-dlp.
        check_tool("yt-dlp", &Settings::expand_path(&engine.ytdlp_path), install_hint_ytdlp(), false),
    ]
}

/// Check if an external tool is available. Optional tools only warn.
fn check_tool(name: &str, program: &Path, hint: &str, required: bool) -> CheckResult {
    let failed = |message: &str| {
        if required {
            CheckResult::error(name, message, hint)
        } else {
            CheckResult::warning(name, message, hint)
        }
    };

    match Command::new(program).arg(version_arg(program)).output() {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .unwrap_or("installed")
                .trim()
                .to_string();
            CheckResult::ok(name, &crate::cli::truncate(&version, 50))
        }
        Ok(_) => failed("installed but not working"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => failed("not found"),
        Err(e) => failed(&format!("error: {}", e)),
    }
}

fn check_worker(settings: &Settings) -> CheckResult {
    match &settings.worker.command {
        None => CheckResult::ok("Worker", "built-in (splice worker)"),
        Some(command) => {
            let program = Settings::expand_path(command);
            let looks_like_path = program.components().count() > 1;
            if looks_like_path && !program.exists() {
                CheckResult::error(
                    "Worker",
                    &format!("{} does not exist", program.display()),
                    "Fix worker.command in the config file",
                )
            } else {
                CheckResult::ok("Worker", &format!("custom ({})", program.display()))
            }
        }
    }
}

/// Check if an OpenAI API key is configured.
fn check_api_key(settings: &Settings) -> CheckResult {
    if let Some(base) = &settings.planner.api_base {
        return CheckResult::ok("Planner API", &format!("{} ({})", base, settings.planner.model));
    }
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if key.starts_with("sk-") && key.len() > 20 => {
            let masked = format!("{}...{}", &key[..7], &key[key.len() - 4..]);
            CheckResult::ok("OPENAI_API_KEY", &format!("configured ({})", masked))
        }
        Ok(key) if key.is_empty() => CheckResult::error(
            "OPENAI_API_KEY",
            "empty",
            "Set with: export OPENAI_API_KEY='sk-...'",
        ),
        Ok(_) => CheckResult::warning(
            "OPENAI_API_KEY",
            "set but format looks unusual",
            "Expected format: sk-... (or set planner.api_base for a local server)",
        ),
        Err(_) => CheckResult::error(
            "OPENAI_API_KEY",
            "not set",
            "Set with: export OPENAI_API_KEY='sk-...'",
        ),
    }
}

fn check_directories(settings: &Settings) -> Vec<CheckResult> {
    [("Data directory", settings.data_dir()), ("Output directory", settings.output_dir())]
        .into_iter()
        .map(|(name, dir)| {
            if dir.is_dir() {
                CheckResult::ok(name, &dir.display().to_string())
            } else {
                CheckResult::warning(
                    name,
                    &format!("{} (will be created)", dir.display()),
                    "Directory will be created on first use",
                )
            }
        })
        .collect()
}

fn check_config_file(config_path: Option<&Path>) -> CheckResult {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(Settings::default_config_path);
    if path.exists() {
        match Settings::load_from(Some(&path)) {
            Ok(_) => CheckResult::ok("Config file", &path.display().to_string()),
            Err(e) => CheckResult::error(
                "Config file",
                &format!("{} does not parse", path.display()),
                &e.to_string(),
            ),
        }
    } else {
        CheckResult::warning(
            "Config file",
            "using defaults",
            "Create with: splice config edit",
        )
    }
}

/// Platform-specific install hint for yt-dlp.
fn install_hint_ytdlp() -> &'static str {
    if cfg!(target_os = "macos") {
        "Install with: brew install yt-dlp"
    } else if cfg!(target_os = "linux") {
        "Install with: pip install yt-dlp (or your package manager)"
    } else {
        "Install from: https://github.com/yt-dlp/yt-dlp"
    }
}

/// Platform-specific install hint for ffmpeg.
fn install_hint_ffmpeg() -> &'static str {
    if cfg!(target_os = "macos") {
        "Install with: brew install ffmpeg"
    } else if cfg!(target_os = "linux") {
        "Install with: sudo apt install ffmpeg (or your package manager)"
    } else {
        "Install from: https://ffmpeg.org/download.html"
    }
}
