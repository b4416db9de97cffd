//! CLI module for Splice.

pub mod commands;
mod output;
pub mod preflight;

pub use output::{truncate, Output};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Splice - agent-driven media editing
///
/// Describe an edit in plain language; a planner picks ffmpeg-backed tools
/// and runs them in a worker process over a stdio tool bridge.
#[derive(Parser, Debug)]
#[command(name = "splice")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Interactive editing session
    Chat,

    /// Carry out a single editing request and exit
    Run {
        /// What to do, e.g. "trim intro.mp4 to the first 10 seconds"
        intent: String,
    },

    /// List the tools the worker offers
    Tools,

    /// Call one tool directly, bypassing the planner
    Call {
        /// Tool name, e.g. trim_video
        tool: String,

        /// Argument as key=value (repeatable)
        #[arg(short = 'a', long = "arg", value_name = "KEY=VALUE")]
        args: Vec<String>,
    },

    /// Serve the media tools over stdin/stdout
    Worker {
        /// Directory outputs are written to
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Check system requirements and configuration
    Doctor,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}
