//! Engine runner backed by the ffmpeg and yt-dlp executables.

use super::operations::{self, CommandArg, EngineCommand, Operation, Program};
use super::MediaEngine;
use crate::bridge::Arguments;
use crate::config::{EngineSettings, Settings};
use crate::error::{Result, SpliceError};
use async_trait::async_trait;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Runs each operation as one external process writing into `output_dir`.
///
/// Outputs with the same name overwrite each other; callers pick distinct
/// names when they need to keep earlier results.
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    output_dir: PathBuf,
    ffmpeg: PathBuf,
    ytdlp: PathBuf,
}

impl FfmpegEngine {
    /// Create an engine using `ffmpeg` and `yt-dlp` from PATH.
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            ffmpeg: PathBuf::from("ffmpeg"),
            ytdlp: PathBuf::from("yt-dlp"),
        }
    }

    /// Override the executables used.
    pub fn with_binaries(mut self, ffmpeg: impl Into<PathBuf>, ytdlp: impl Into<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self.ytdlp = ytdlp.into();
        self
    }

    /// Engine using the executables named in `settings`.
    pub fn from_settings(settings: &EngineSettings, output_dir: PathBuf) -> Self {
        Self::new(output_dir).with_binaries(
            Settings::expand_path(&settings.ffmpeg_path),
            Settings::expand_path(&settings.ytdlp_path),
        )
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    async fn run(&self, command: EngineCommand) -> Result<String> {
        let op = command.operation;

        tokio::fs::create_dir_all(&self.output_dir).await?;
        if let Some(dir) = &command.create_dir {
            tokio::fs::create_dir_all(dir).await?;
        }

        // Concat lists live in private temp files for the duration of the run.
        let mut list_files = Vec::new();
        let mut argv: Vec<OsString> = Vec::with_capacity(command.args.len());
        for arg in command.args {
            match arg {
                CommandArg::Value(value) => argv.push(value),
                CommandArg::ConcatList(contents) => {
                    let mut file = tempfile::Builder::new()
                        .prefix("splice-concat-")
                        .suffix(".txt")
                        .tempfile()?;
                    file.write_all(contents.as_bytes())?;
                    file.flush()?;
                    argv.push(file.path().as_os_str().to_owned());
                    list_files.push(file);
                }
            }
        }

        let (tool_name, program) = match command.program {
            Program::Ffmpeg => ("ffmpeg", &self.ffmpeg),
            Program::YtDlp => ("yt-dlp", &self.ytdlp),
        };

        debug!("Running {} {:?}", program.display(), argv);

        let result = Command::new(program)
            .args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        drop(list_files);

        match result {
            Ok(out) if out.status.success() => {
                let location = command.output.display().to_string();
                info!("{} wrote {}", op, location);
                Ok(location)
            }
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                let stderr = stderr.trim();
                if stderr.is_empty() {
                    Err(op.failure(format!("{} exited with {}", tool_name, out.status)))
                } else {
                    Err(op.failure(stderr))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SpliceError::ToolNotFound(tool_name.into()))
            }
            Err(e) => Err(op.failure(format!("{} execution failed: {}", tool_name, e))),
        }
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    #[instrument(skip(self, arguments))]
    async fn execute(&self, operation: &str, arguments: &Arguments) -> Result<String> {
        let op = Operation::from_name(operation)
            .ok_or_else(|| SpliceError::UnknownTool(operation.to_string()))?;
        let command = operations::build(op, arguments, &self.output_dir)?;
        self.run(command).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn trim_args() -> Arguments {
        match json!({
            "input_path": "a.mp4",
            "start_time": "00:00:05",
            "end_time": "00:00:10",
            "output_name": "trimmed_video.mp4"
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_success_reports_output_path() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FfmpegEngine::new(dir.path().join("outputs")).with_binaries("true", "true");

        let location = engine.execute("trim_video", &trim_args()).await.unwrap();

        assert_eq!(
            location,
            dir.path().join("outputs").join("trimmed_video.mp4").display().to_string()
        );
        assert_ne!(location, "a.mp4");
        assert!(dir.path().join("outputs").is_dir());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_operation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FfmpegEngine::new(dir.path().to_path_buf()).with_binaries("false", "false");

        let err = engine.execute("trim_video", &trim_args()).await.unwrap_err();
        assert!(matches!(err, SpliceError::Operation(_)));
        assert!(err.to_string().starts_with("Error trimming video: ffmpeg exited with"));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FfmpegEngine::new(dir.path().to_path_buf())
            .with_binaries("/nonexistent/ffmpeg", "/nonexistent/yt-dlp");

        let err = engine.execute("trim_video", &trim_args()).await.unwrap_err();
        assert!(matches!(err, SpliceError::ToolNotFound(ref name) if name == "ffmpeg"));
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FfmpegEngine::new(dir.path().to_path_buf());
        let err = engine.execute("does_not_exist", &Arguments::new()).await.unwrap_err();
        assert!(matches!(err, SpliceError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn test_extract_frames_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FfmpegEngine::new(dir.path().to_path_buf()).with_binaries("true", "true");
        let args = match json!({"input_path": "a.mp4", "interval": 1, "output_dir_name": "frames"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        let location = engine.execute("extract_frames", &args).await.unwrap();
        assert!(Path::new(&location).is_dir());
    }

    #[test]
    fn test_from_settings_uses_configured_binaries() {
        let settings = EngineSettings {
            ffmpeg_path: "/opt/ffmpeg/bin/ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            ytdlp_path: "yt-dlp".to_string(),
        };
        let engine = FfmpegEngine::from_settings(&settings, PathBuf::from("/tmp/out"));

        assert_eq!(engine.ffmpeg, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(engine.ytdlp, PathBuf::from("yt-dlp"));
        assert_eq!(engine.output_dir(), Path::new("/tmp/out"));
    }
}
