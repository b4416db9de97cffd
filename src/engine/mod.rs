//! Media engine adapter.
//!
//! Turns a tool name plus bound arguments into one run of an external
//! transcoding or download program and reports where the output landed.

mod ffmpeg;
pub mod operations;

pub use ffmpeg::FfmpegEngine;
pub use operations::{CommandArg, EngineCommand, Operation, Program};

use crate::bridge::Arguments;
use crate::error::Result;
use async_trait::async_trait;

/// Capability that executes media operations.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Run `operation` and return the output location.
    ///
    /// Failures that mean "the transformation could not be done" are
    /// reported as [`SpliceError::Operation`](crate::error::SpliceError::Operation).
    async fn execute(&self, operation: &str, arguments: &Arguments) -> Result<String>;
}
