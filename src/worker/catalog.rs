//! Tool definitions served by the worker.

use crate::bridge::{ParamType, ParameterSpec, ToolDescriptor};
use serde_json::json;

const TIME_FORMAT: &str = "'HH:MM:SS[.fff]', 'MM:SS' or seconds";

fn tool(name: &str, description: &str, parameters: Vec<ParameterSpec>) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        parameter_schema: parameters,
    }
}

fn input(description: &str) -> ParameterSpec {
    ParameterSpec::required("input_path", ParamType::String, description)
}

fn output_name(default: &str, description: &str) -> ParameterSpec {
    ParameterSpec::optional("output_name", ParamType::String, json!(default), description)
}

fn time(name: &str, what: &str) -> ParameterSpec {
    ParameterSpec::required(
        name,
        ParamType::String,
        &format!("{} in format {}", what, TIME_FORMAT),
    )
}

/// Get all available tools, in catalog order.
pub fn tool_catalog() -> Vec<ToolDescriptor> {
    vec![
        tool(
            "download_youtube_video",
            "Download a YouTube video as mp4. Returns the path to the downloaded file.",
            vec![
                ParameterSpec::required("url", ParamType::String, "YouTube video URL"),
                output_name("downloaded_video.mp4", "Name of the downloaded file"),
            ],
        ),
        tool(
            "trim_video",
            "Trim a video file to the segment between two timestamps. \
                Returns the path to the trimmed video.",
            vec![
                input("Path to the input video file"),
                time("start_time", "Start time"),
                time("end_time", "End time"),
                output_name("trimmed_video.mp4", "Name of the trimmed video file"),
            ],
        ),
        tool(
            "merge_videos",
            "Concatenate two video files into one. Returns the path to the merged video.",
            vec![
                ParameterSpec::required("input_path1", ParamType::String, "Path to the first video"),
                ParameterSpec::required("input_path2", ParamType::String, "Path to the second video"),
                output_name("merged_video.mp4", "Name of the merged video file"),
            ],
        ),
        tool(
            "extract_audio",
            "Extract the audio track of a video file. Returns the path to the audio file.",
            vec![
                input("Path to the input video file"),
                output_name("extracted_audio.mp3", "Name of the audio file"),
            ],
        ),
        tool(
            "trim_audio",
            "Trim an audio file to the segment between two timestamps. \
                Returns the path to the trimmed audio.",
            vec![
                input("Path to the input audio file"),
                time("start_time", "Start time"),
                time("end_time", "End time"),
                output_name("trimmed_audio.mp3", "Name of the trimmed audio file"),
            ],
        ),
        tool(
            "convert_video_format",
            "Convert a video file to another container format. \
                Returns the path to the converted video.",
            vec![
                input("Path to the input video file"),
                ParameterSpec::optional(
                    "output_format",
                    ParamType::String,
                    json!("avi"),
                    "Target format, e.g. 'avi' or 'mkv'",
                ),
                output_name("converted_video", "Name of the output file without extension"),
            ],
        ),
        tool(
            "add_watermark",
            "Overlay an image on a video. Returns the path to the watermarked video.",
            vec![
                input("Path to the input video file"),
                ParameterSpec::required(
                    "watermark_path",
                    ParamType::String,
                    "Path to the watermark image",
                ),
                ParameterSpec::optional(
                    "position",
                    ParamType::String,
                    json!("10:10"),
                    "Watermark position in 'x:y' format",
                ),
                output_name("watermarked_video.mp4", "Name of the watermarked video file"),
            ],
        ),
        tool(
            "extract_frames",
            "Save one frame every `interval` seconds as PNG images. \
                Returns the directory containing the frames.",
            vec![
                input("Path to the input video file"),
                ParameterSpec::optional(
                    "interval",
                    ParamType::Integer,
                    json!(1),
                    "Seconds between extracted frames",
                ),
                ParameterSpec::optional(
                    "output_dir_name",
                    ParamType::String,
                    json!("extracted_frames"),
                    "Name of the directory to save frames in",
                ),
            ],
        ),
        tool(
            "change_audio_speed",
            "Change the playback speed of an audio file. \
                Returns the path to the new audio file.",
            vec![
                input("Path to the input audio file"),
                ParameterSpec::required(
                    "speed_factor",
                    ParamType::Number,
                    "Speed multiplier, e.g. 1.5 for 1.5x speed",
                ),
                output_name("speed_changed_audio.mp3", "Name of the output audio file"),
            ],
        ),
        tool(
            "change_video_speed",
            "Change the playback speed of a video file. \
                Returns the path to the new video file.",
            vec![
                input("Path to the input video file"),
                ParameterSpec::required(
                    "speed_factor",
                    ParamType::Number,
                    "Speed multiplier, e.g. 1.5 for 1.5x speed",
                ),
                output_name("speed_changed_video.mp4", "Name of the output video file"),
            ],
        ),
        tool(
            "mute_video_audio",
            "Remove the audio track from a video. Returns the path to the muted video.",
            vec![
                input("Path to the input video file"),
                output_name("muted_video.mp4", "Name of the muted video file"),
            ],
        ),
        tool(
            "create_gif",
            "Create an animated GIF from a segment of a video. \
                Returns the path to the GIF.",
            vec![
                input("Path to the input video file"),
                time("start_time", "Start time"),
                ParameterSpec::required(
                    "duration",
                    ParamType::String,
                    "Length of the GIF in seconds",
                ),
                ParameterSpec::optional("fps", ParamType::Integer, json!(10), "Frames per second"),
                ParameterSpec::optional(
                    "width",
                    ParamType::Integer,
                    json!(480),
                    "Width in pixels; height keeps the aspect ratio",
                ),
                output_name("output.gif", "Name of the GIF file"),
            ],
        ),
    ]
}
