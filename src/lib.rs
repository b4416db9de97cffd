//! Splice - agent-driven media editing
//!
//! A planner turns plain-language editing requests into tool calls, and a
//! separate worker process carries them out with ffmpeg and yt-dlp. The two
//! sides talk JSON-RPC over the worker's stdin/stdout.
//!
//! # Architecture
//!
//! - `bridge` - Dispatch channel, tool registry and per-tool proxies
//! - `worker` - The worker-side server and its tool catalog
//! - `engine` - Media operations and the ffmpeg-backed executor
//! - `agent` - Planner abstraction, sessions and the planning loop driver
//! - `config` - Configuration management
//! - `cli` - Command-line surface
//!
//! # Example
//!
//! ```rust,no_run
//! use splice::agent::{Connector, WorkerConnector};
//! use splice::config::Settings;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let session = WorkerConnector::from_settings(&settings, None)?.connect().await?;
//!
//!     let outcome = session
//!         .proxies()
//!         .invoke(
//!             "trim_video",
//!             &json!({"input_path": "talk.mp4", "start_time": "00:00:05", "end_time": "00:00:20"}),
//!         )
//!         .await?;
//!     println!("{}", outcome);
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod openai;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use error::{Result, SpliceError};
