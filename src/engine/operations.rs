//! Per-operation argument marshaling into external-engine commands.
//!
//! Everything here is pure: a bound argument map and an output directory go
//! in, a fully specified [`EngineCommand`] comes out. Nothing is spawned.

use crate::bridge::Arguments;
use crate::error::{Result, SpliceError};
use regex::Regex;
use serde_json::Value;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

/// Operations the engine knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    DownloadYoutubeVideo,
    TrimVideo,
    MergeVideos,
    ExtractAudio,
    TrimAudio,
    ConvertVideoFormat,
    AddWatermark,
    ExtractFrames,
    ChangeAudioSpeed,
    ChangeVideoSpeed,
    MuteVideoAudio,
    CreateGif,
}

impl Operation {
    pub const ALL: [Operation; 12] = [
        Operation::DownloadYoutubeVideo,
        Operation::TrimVideo,
        Operation::MergeVideos,
        Operation::ExtractAudio,
        Operation::TrimAudio,
        Operation::ConvertVideoFormat,
        Operation::AddWatermark,
        Operation::ExtractFrames,
        Operation::ChangeAudioSpeed,
        Operation::ChangeVideoSpeed,
        Operation::MuteVideoAudio,
        Operation::CreateGif,
    ];

    /// Tool name exposed over the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::DownloadYoutubeVideo => "download_youtube_video",
            Operation::TrimVideo => "trim_video",
            Operation::MergeVideos => "merge_videos",
            Operation::ExtractAudio => "extract_audio",
            Operation::TrimAudio => "trim_audio",
            Operation::ConvertVideoFormat => "convert_video_format",
            Operation::AddWatermark => "add_watermark",
            Operation::ExtractFrames => "extract_frames",
            Operation::ChangeAudioSpeed => "change_audio_speed",
            Operation::ChangeVideoSpeed => "change_video_speed",
            Operation::MuteVideoAudio => "mute_video_audio",
            Operation::CreateGif => "create_gif",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    /// Prefix for failure messages, e.g. "Error trimming video".
    pub fn failure_prefix(&self) -> &'static str {
        match self {
            Operation::DownloadYoutubeVideo => "Error downloading video",
            Operation::TrimVideo => "Error trimming video",
            Operation::MergeVideos => "Error merging videos",
            Operation::ExtractAudio => "Error extracting audio",
            Operation::TrimAudio => "Error trimming audio",
            Operation::ConvertVideoFormat => "Error converting video format",
            Operation::AddWatermark => "Error adding watermark",
            Operation::ExtractFrames => "Error extracting frames",
            Operation::ChangeAudioSpeed => "Error changing audio speed",
            Operation::ChangeVideoSpeed => "Error changing video speed",
            Operation::MuteVideoAudio => "Error muting video audio",
            Operation::CreateGif => "Error creating GIF",
        }
    }

    /// Build an operation failure carrying this operation's prefix.
    pub fn failure(&self, reason: impl std::fmt::Display) -> SpliceError {
        SpliceError::Operation(format!("{}: {}", self.failure_prefix(), reason))
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// External program a command runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Program {
    Ffmpeg,
    YtDlp,
}

/// One command-line argument.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandArg {
    Value(OsString),
    /// Contents of an ffmpeg concat list. The runner writes it to a private
    /// temporary file and substitutes that file's path.
    ConcatList(String),
}

/// A fully specified engine invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineCommand {
    pub operation: Operation,
    pub program: Program,
    pub args: Vec<CommandArg>,
    /// Location reported back to the caller on success.
    pub output: PathBuf,
    /// Directory the runner must create before spawning.
    pub create_dir: Option<PathBuf>,
}

impl EngineCommand {
    fn new(operation: Operation, program: Program, output: PathBuf) -> Self {
        Self {
            operation,
            program,
            args: Vec::new(),
            output,
            create_dir: None,
        }
    }

    fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(CommandArg::Value(arg.into()));
        self
    }

    fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args
            .extend(args.into_iter().map(|a| CommandArg::Value(a.into())));
        self
    }

    fn concat_list(mut self, contents: String) -> Self {
        self.args.push(CommandArg::ConcatList(contents));
        self
    }

    /// Common ffmpeg preamble: overwrite outputs, only log errors.
    fn ffmpeg(operation: Operation, output: PathBuf) -> Self {
        Self::new(operation, Program::Ffmpeg, output).args(["-y", "-loglevel", "error"])
    }

    /// Append the output path as the final argument.
    fn then_output(self) -> Self {
        let output = self.output.clone();
        self.arg(output)
    }
}

/// Typed access to a bound argument map.
struct Args<'a> {
    op: Operation,
    map: &'a Arguments,
}

impl<'a> Args<'a> {
    fn value(&self, name: &str) -> Result<&'a Value> {
        self.map
            .get(name)
            .filter(|v| !v.is_null())
            .ok_or_else(|| self.op.failure(format!("missing argument '{}'", name)))
    }

    fn str(&self, name: &str) -> Result<&'a str> {
        self.value(name)?
            .as_str()
            .ok_or_else(|| self.op.failure(format!("argument '{}' must be a string", name)))
    }

    fn positive_f64(&self, name: &str) -> Result<f64> {
        let value = self
            .value(name)?
            .as_f64()
            .ok_or_else(|| self.op.failure(format!("argument '{}' must be a number", name)))?;
        if value > 0.0 && value.is_finite() {
            Ok(value)
        } else {
            Err(self.op.failure(format!("'{}' must be positive, got {}", name, value)))
        }
    }

    fn positive_u64(&self, name: &str) -> Result<u64> {
        let value = self.positive_f64(name)?;
        if value.fract() != 0.0 {
            return Err(self.op.failure(format!("'{}' must be a whole number, got {}", name, value)));
        }
        Ok(value as u64)
    }

    fn timecode(&self, name: &str) -> Result<&'a str> {
        let value = self.str(name)?.trim();
        if timecode_regex().is_match(value) {
            Ok(value)
        } else {
            Err(self.op.failure(format!(
                "'{}' must be HH:MM:SS, MM:SS or seconds, got '{}'",
                name, value
            )))
        }
    }

    /// Resolve a bare file name inside `output_dir`.
    fn output_in(&self, name: &str, output_dir: &Path) -> Result<PathBuf> {
        let file_name = self.str(name)?;
        Ok(output_dir.join(checked_file_name(self.op, file_name)?))
    }
}

fn timecode_regex() -> &'static Regex {
    static TIMECODE: OnceLock<Regex> = OnceLock::new();
    TIMECODE.get_or_init(|| {
        Regex::new(r"^(?:\d+(?:\.\d+)?|\d+:\d{2}(?::\d{2})?(?:\.\d+)?)$").expect("Invalid regex")
    })
}

/// Reject names that would escape the output directory.
fn checked_file_name(op: Operation, name: &str) -> Result<String> {
    let name = name.trim();
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(name.to_string()),
        _ => Err(op.failure(format!(
            "output name must be a plain file name, got '{}'",
            name
        ))),
    }
}

/// Build the engine command for `operation`.
///
/// `arguments` are expected to be bound already (defaults filled in).
pub fn build(operation: Operation, arguments: &Arguments, output_dir: &Path) -> Result<EngineCommand> {
    let args = Args {
        op: operation,
        map: arguments,
    };

    let command = match operation {
        Operation::DownloadYoutubeVideo => {
            let url = args.str("url")?;
            let parsed = url::Url::parse(url).map_err(|e| operation.failure(format!("invalid URL '{}': {}", url, e)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(operation.failure(format!("unsupported URL scheme '{}'", parsed.scheme())));
            }
            let output = args.output_in("output_name", output_dir)?;
            EngineCommand::new(operation, Program::YtDlp, output.clone())
                .args(["--format", "best[ext=mp4]", "--merge-output-format", "mp4"])
                .args(["--no-playlist", "--quiet", "--no-warnings", "--force-overwrites"])
                .arg("--output")
                .arg(output)
                .arg(parsed.as_str())
        }

        Operation::TrimVideo => {
            let start = args.timecode("start_time")?;
            let end = args.timecode("end_time")?;
            EngineCommand::ffmpeg(operation, args.output_in("output_name", output_dir)?)
                .args(["-ss", start, "-to", end, "-i"])
                .arg(args.str("input_path")?)
                .args(["-c", "copy"])
                .then_output()
        }

        Operation::MergeVideos => {
            let list = [args.str("input_path1")?, args.str("input_path2")?]
                .iter()
                .map(|path| format!("file '{}'\n", path.replace('\'', r"'\''")))
                .collect::<String>();
            EngineCommand::ffmpeg(operation, args.output_in("output_name", output_dir)?)
                .args(["-f", "concat", "-safe", "0", "-i"])
                .concat_list(list)
                .args(["-c", "copy"])
                .then_output()
        }

        Operation::ExtractAudio => EngineCommand::ffmpeg(operation, args.output_in("output_name", output_dir)?)
            .arg("-i")
            .arg(args.str("input_path")?)
            .args(["-vn", "-codec:a", "libmp3lame"])
            .then_output(),

        Operation::TrimAudio => {
            let start = args.timecode("start_time")?;
            let end = args.timecode("end_time")?;
            EngineCommand::ffmpeg(operation, args.output_in("output_name", output_dir)?)
                .args(["-ss", start, "-to", end, "-i"])
                .arg(args.str("input_path")?)
                .args(["-codec:a", "libmp3lame"])
                .then_output()
        }

        Operation::ConvertVideoFormat => {
            let format = args.str("output_format")?.trim().trim_start_matches('.');
            if format.is_empty() || !format.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(operation.failure(format!("invalid output format '{}'", format)));
            }
            let stem = checked_file_name(operation, args.str("output_name")?)?;
            let output = output_dir.join(format!("{}.{}", stem, format));
            EngineCommand::ffmpeg(operation, output)
                .arg("-i")
                .arg(args.str("input_path")?)
                .then_output()
        }

        Operation::AddWatermark => {
            let position = args.str("position")?;
            let (x, y) = position
                .split_once(':')
                .filter(|(x, y)| !x.trim().is_empty() && !y.trim().is_empty())
                .ok_or_else(|| operation.failure(format!("position must be 'x:y', got '{}'", position)))?;
            EngineCommand::ffmpeg(operation, args.output_in("output_name", output_dir)?)
                .arg("-i")
                .arg(args.str("input_path")?)
                .arg("-i")
                .arg(args.str("watermark_path")?)
                .arg("-filter_complex")
                .arg(format!("overlay={}:{}", x.trim(), y.trim()))
                .then_output()
        }

        Operation::ExtractFrames => {
            let interval = args.positive_u64("interval")?;
            let frames_dir = args.output_in("output_dir_name", output_dir)?;
            let mut command = EngineCommand::ffmpeg(operation, frames_dir.clone())
                .arg("-i")
                .arg(args.str("input_path")?)
                .arg("-vf")
                .arg(format!("fps=1/{}", interval))
                .arg(frames_dir.join("frame_%04d.png"));
            command.create_dir = Some(frames_dir);
            command
        }

        Operation::ChangeAudioSpeed => {
            let factor = args.positive_f64("speed_factor")?;
            EngineCommand::ffmpeg(operation, args.output_in("output_name", output_dir)?)
                .arg("-i")
                .arg(args.str("input_path")?)
                .arg("-filter:a")
                .arg(atempo_chain(factor))
                .then_output()
        }

        Operation::ChangeVideoSpeed => {
            let factor = args.positive_f64("speed_factor")?;
            EngineCommand::ffmpeg(operation, args.output_in("output_name", output_dir)?)
                .arg("-i")
                .arg(args.str("input_path")?)
                .arg("-filter:v")
                .arg(format!("setpts={}*PTS", 1.0 / factor))
                .then_output()
        }

        Operation::MuteVideoAudio => EngineCommand::ffmpeg(operation, args.output_in("output_name", output_dir)?)
            .arg("-i")
            .arg(args.str("input_path")?)
            .args(["-an", "-c:v", "copy"])
            .then_output(),

        Operation::CreateGif => {
            let start = args.timecode("start_time")?;
            let duration = args.timecode("duration")?;
            let fps = args.positive_u64("fps")?;
            let width = args.positive_u64("width")?;
            EngineCommand::ffmpeg(operation, args.output_in("output_name", output_dir)?)
                .args(["-ss", start, "-t", duration, "-i"])
                .arg(args.str("input_path")?)
                .arg("-vf")
                .arg(format!("fps={},scale={}:-1", fps, width))
                .args(["-loop", "0"])
                .then_output()
        }
    };

    Ok(command)
}

/// `atempo` accepts 0.5..=2.0 per stage; chain stages for larger changes.
fn atempo_chain(factor: f64) -> String {
    let mut stages = Vec::new();
    let mut remaining = factor;
    while remaining > 2.0 {
        stages.push("atempo=2.0".to_string());
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        stages.push("atempo=0.5".to_string());
        remaining /= 0.5;
    }
    stages.push(format!("atempo={}", remaining));
    stages.join(",")
}
