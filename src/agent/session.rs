//! Connected worker session: channel, registry and proxies.

use crate::bridge::{
    ChannelOptions, DispatchChannel, ProxySet, ToolDescriptor, ToolRegistry, WorkerCommand,
};
use crate::config::Settings;
use crate::error::{Result, SpliceError};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Everything one discovery cycle produced.
///
/// Proxies live exactly as long as the session; a reconnect builds a new one.
pub struct Session {
    channel: Arc<DispatchChannel>,
    registry: ToolRegistry,
    proxies: ProxySet,
}

impl Session {
    /// Discover tools on an already-handshaken channel.
    pub async fn establish(channel: DispatchChannel, timeout: Option<Duration>) -> Result<Self> {
        let channel = Arc::new(channel);
        let registry = match ToolRegistry::discover(&channel).await {
            Ok(registry) => registry,
            Err(e) => {
                channel.close().await;
                return Err(e);
            }
        };
        let proxies = ProxySet::build(&registry, Arc::clone(&channel), timeout);
        Ok(Self {
            channel,
            registry,
            proxies,
        })
    }

    pub fn proxies(&self) -> &ProxySet {
        &self.proxies
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        self.registry.descriptors()
    }

    pub fn channel(&self) -> &Arc<DispatchChannel> {
        &self.channel
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    pub async fn close(&self) {
        self.channel.close().await;
    }
}

/// Opens new sessions; used for the first connect and for reconnects.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Session>;
}

/// Connector that spawns a worker process.
#[derive(Debug, Clone)]
pub struct WorkerConnector {
    command: WorkerCommand,
    options: ChannelOptions,
    timeout: Option<Duration>,
}

impl WorkerConnector {
    pub fn new(command: WorkerCommand, options: ChannelOptions, timeout: Option<Duration>) -> Self {
        Self {
            command,
            options,
            timeout,
        }
    }

    /// Build from settings. `config_path` is forwarded to a self-spawned worker.
    pub fn from_settings(settings: &Settings, config_path: Option<&Path>) -> Result<Self> {
        Ok(Self::new(
            worker_command(settings, config_path)?,
            settings.channel_options(),
            settings.invocation_timeout(),
        ))
    }

    pub fn command(&self) -> &WorkerCommand {
        &self.command
    }
}

#[async_trait]
impl Connector for WorkerConnector {
    async fn connect(&self) -> Result<Session> {
        let channel = DispatchChannel::open(&self.command, self.options.clone()).await?;
        let session = Session::establish(channel, self.timeout).await?;
        info!("Session ready with {} tool(s)", session.registry().len());
        Ok(session)
    }
}

/// Command line for the worker described by `settings`.
///
/// Without a configured command, this binary's own `worker` subcommand is
/// used with the configured output directory.
pub fn worker_command(settings: &Settings, config_path: Option<&Path>) -> Result<WorkerCommand> {
    if let Some(program) = &settings.worker.command {
        let mut command = WorkerCommand::new(Settings::expand_path(program));
        for arg in &settings.worker.args {
            command = command.arg(arg);
        }
        return Ok(command);
    }

    let exe = std::env::current_exe()
        .map_err(|e| SpliceError::Config(format!("cannot locate own executable: {}", e)))?;
    let mut command = WorkerCommand::new(exe);
    if let Some(path) = config_path {
        command = command.arg("--config").arg(path);
    }
    Ok(command
        .arg("worker")
        .arg("--output-dir")
        .arg(settings.output_dir()))
}
