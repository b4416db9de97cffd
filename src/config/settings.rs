//! Configuration settings for Splice.

use crate::bridge::ChannelOptions;
use crate::error::{Result, SpliceError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub worker: WorkerSettings,
    pub channel: ChannelSettings,
    pub engine: EngineSettings,
    pub planner: PlannerSettings,
    pub driver: DriverSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for application data.
    pub data_dir: String,
    /// Log level used when no `-v` flag is given (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.splice".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// How the worker process is launched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Worker executable. Defaults to this binary's own `worker` subcommand.
    pub command: Option<String>,
    /// Arguments for a custom `command`.
    pub args: Vec<String>,
    /// Directory the worker writes outputs to. Defaults to `<data_dir>/outputs`.
    pub output_dir: Option<String>,
}

/// Dispatch channel tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    /// Maximum concurrently outstanding tool calls (minimum 1).
    pub max_in_flight: usize,
    /// Limit for the handshake and discovery round trips.
    pub handshake_timeout_secs: u64,
    /// Per-call wait limit; 0 waits forever.
    pub invocation_timeout_secs: u64,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            handshake_timeout_secs: 10,
            invocation_timeout_secs: 600,
        }
    }
}

/// External media tool locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub ytdlp_path: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}

/// Language-model planner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    /// Chat model with tool-calling support.
    pub model: String,
    /// OpenAI-compatible API base URL, e.g. `http://localhost:11434/v1` for Ollama.
    pub api_base: Option<String>,
    pub temperature: f32,
    /// Maximum planning rounds per intent.
    pub max_iterations: usize,
    pub request_timeout_secs: u64,
    /// Replaces the built-in system prompt preamble.
    pub system_prompt: Option<String>,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            api_base: None,
            temperature: 0.0,
            max_iterations: 10,
            request_timeout_secs: 120,
            system_prompt: None,
        }
    }
}

/// How a batch of tool selections from one planning step runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Execution {
    /// One at a time, in the order the planner listed them.
    #[default]
    #[serde(alias = "serial")]
    Sequential,
    /// All at once over the multiplexed channel.
    #[serde(alias = "parallel")]
    Concurrent,
}

/// Planning loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    pub execution: Execution,
    /// Conversation turns kept between intents.
    pub history_limit: usize,
    /// Times a closed worker channel may be reopened per process.
    pub max_reconnects: u32,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            execution: Execution::Sequential,
            history_limit: 40,
            max_reconnects: 2,
        }
    }
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SpliceError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("splice")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Directory the worker writes outputs to.
    pub fn output_dir(&self) -> PathBuf {
        match &self.worker.output_dir {
            Some(dir) => Self::expand_path(dir),
            None => self.data_dir().join("outputs"),
        }
    }

    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions {
            max_in_flight: self.channel.max_in_flight.max(1),
            handshake_timeout: Duration::from_secs(self.channel.handshake_timeout_secs),
        }
    }

    /// Per-call wait limit, if any.
    pub fn invocation_timeout(&self) -> Option<Duration> {
        match self.channel.invocation_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
