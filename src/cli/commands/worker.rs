//! Worker command: serve the media tools over stdio.

use crate::config::Settings;
use crate::engine::FfmpegEngine;
use crate::worker::WorkerServer;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Run the worker until stdin closes. Stdout carries protocol frames only.
pub async fn run_worker(output_dir: Option<PathBuf>, settings: &Settings) -> Result<()> {
    let output_dir = output_dir.unwrap_or_else(|| settings.output_dir());
    info!("Writing outputs to {}", output_dir.display());

    let engine = FfmpegEngine::from_settings(&settings.engine, output_dir);
    WorkerServer::new(Arc::new(engine)).run().await?;
    Ok(())
}
