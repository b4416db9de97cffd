//! Fixtures that wire a real [`DispatchChannel`] to an in-process worker.

use crate::bridge::protocol::{
    InitializeResult, PeerInfo, RpcRequest, RpcResponse, ServerCapabilities, ToolsCapability,
    ToolsListResult, METHOD_INITIALIZE, METHOD_TOOLS_LIST, PROTOCOL_VERSION,
};
use crate::bridge::{Arguments, ChannelOptions, DispatchChannel, ToolDescriptor};
use crate::engine::MediaEngine;
use crate::error::{Result, SpliceError};
use crate::worker::{tool_catalog, WorkerServer};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Engine that records calls and answers from a script instead of running
/// anything.
#[derive(Default)]
pub struct ScriptedEngine {
    delays: HashMap<String, Duration>,
    failures: HashMap<String, String>,
    calls: Mutex<Vec<(String, Arguments)>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, operation: &str, delay: Duration) -> Self {
        self.delays.insert(operation.to_string(), delay);
        self
    }

    pub fn with_failure(mut self, operation: &str, message: &str) -> Self {
        self.failures.insert(operation.to_string(), message.to_string());
        self
    }

    /// Calls received so far, in arrival order.
    pub fn calls(&self) -> Vec<(String, Arguments)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaEngine for ScriptedEngine {
    async fn execute(&self, operation: &str, arguments: &Arguments) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((operation.to_string(), arguments.clone()));

        if let Some(delay) = self.delays.get(operation) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(message) = self.failures.get(operation) {
            return Err(SpliceError::Operation(message.clone()));
        }

        let name = ["output_name", "output_dir_name"]
            .iter()
            .find_map(|key| arguments.get(*key).and_then(|v| v.as_str()))
            .unwrap_or(operation);
        Ok(format!("/outputs/{}", name))
    }
}

/// Connect a channel to a [`WorkerServer`] running on `engine`.
pub async fn connect_in_process(
    engine: Arc<dyn MediaEngine>,
    options: ChannelOptions,
) -> DispatchChannel {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server);
    tokio::spawn(WorkerServer::new(engine).serve(server_read, server_write));

    let (read, write) = tokio::io::split(client);
    DispatchChannel::connect(read, write, None, options)
        .await
        .expect("in-process handshake failed")
}

/// Connect a channel to a hand-scripted worker serving the default catalog.
pub async fn connect_scripted<F>(responder: F) -> DispatchChannel
where
    F: Fn(&RpcRequest) -> Vec<String> + Send + 'static,
{
    connect_scripted_with_catalog(tool_catalog(), responder).await
}

/// Connect a channel to a hand-scripted worker.
///
/// The fixture answers the handshake and discovery itself; every other
/// request is passed to `responder`, whose lines are written back verbatim.
pub async fn connect_scripted_with_catalog<F>(
    catalog: Vec<ToolDescriptor>,
    responder: F,
) -> DispatchChannel
where
    F: Fn(&RpcRequest) -> Vec<String> + Send + 'static,
{
    connect_scripted_bytes(catalog, move |request| {
        responder(request).into_iter().map(String::into_bytes).collect()
    })
    .await
}

/// Like [`connect_scripted_with_catalog`], but replies are raw bytes, each
/// followed by a newline.
pub async fn connect_scripted_bytes<F>(catalog: Vec<ToolDescriptor>, responder: F) -> DispatchChannel
where
    F: Fn(&RpcRequest) -> Vec<Vec<u8>> + Send + 'static,
{
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (server_read, mut server_write) = tokio::io::split(server);

    tokio::spawn(async move {
        let mut lines = BufReader::new(server_read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let request: RpcRequest = serde_json::from_str(&line).unwrap();
            let replies = match request.method.as_str() {
                METHOD_INITIALIZE => {
                    let result = InitializeResult {
                        protocol_version: PROTOCOL_VERSION.to_string(),
                        server_info: PeerInfo {
                            name: "scripted".to_string(),
                            version: "0".to_string(),
                        },
                        capabilities: ServerCapabilities {
                            tools: ToolsCapability {
                                list_changed: false,
                            },
                        },
                    };
                    let response =
                        RpcResponse::success(request.id.clone(), serde_json::to_value(result).unwrap());
                    vec![serde_json::to_vec(&response).unwrap()]
                }
                METHOD_TOOLS_LIST => {
                    let result = ToolsListResult {
                        tools: catalog.clone(),
                    };
                    let response =
                        RpcResponse::success(request.id.clone(), serde_json::to_value(result).unwrap());
                    vec![serde_json::to_vec(&response).unwrap()]
                }
                _ => responder(&request),
            };
            for reply in replies {
                if server_write.write_all(&reply).await.is_err()
                    || server_write.write_all(b"\n").await.is_err()
                {
                    return;
                }
            }
        }
    });

    let (read, write) = tokio::io::split(client);
    DispatchChannel::connect(read, write, None, ChannelOptions::default())
        .await
        .expect("scripted handshake failed")
}
