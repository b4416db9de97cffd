//! Worker-side JSON-RPC server.

use crate::bridge::protocol::{
    InitializeResult, PeerInfo, RpcRequest, RpcResponse, ServerCapabilities, ToolCallParams,
    ToolCallResult, ToolsCapability, ToolsListResult, INTERNAL_ERROR, INVALID_PARAMS, METHOD_INITIALIZE,
    METHOD_NOT_FOUND, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST, NOT_INITIALIZED, PARSE_ERROR,
    PROTOCOL_VERSION,
};
use crate::bridge::{Outcome, ToolDescriptor};
use crate::engine::MediaEngine;
use crate::error::Result;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

const SERVER_NAME: &str = "splice-worker";

/// Serves the tool catalog and runs tool calls on a [`MediaEngine`].
///
/// Each `tools/call` runs on its own task; a single writer task puts
/// responses on the output stream in completion order.
pub struct WorkerServer {
    engine: Arc<dyn MediaEngine>,
    catalog: Arc<[ToolDescriptor]>,
}

impl WorkerServer {
    pub fn new(engine: Arc<dyn MediaEngine>) -> Self {
        Self {
            engine,
            catalog: super::tool_catalog().into(),
        }
    }

    /// Serve a different catalog.
    pub fn with_catalog(mut self, catalog: Vec<ToolDescriptor>) -> Self {
        self.catalog = catalog.into();
        self
    }

    /// Serve on the process's stdin/stdout until stdin closes.
    pub async fn run(self) -> Result<()> {
        info!("Worker starting with {} tool(s)", self.catalog.len());
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve over arbitrary streams until `reader` ends.
    ///
    /// Calls still running at that point are aborted.
    pub async fn serve<R, W>(self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(write_responses(writer, rx));

        let mut reader = BufReader::new(reader);
        let mut frame = Vec::new();
        let mut calls = JoinSet::new();
        let mut initialized = false;

        loop {
            // Partial reads stay in `frame` when the other branch wins.
            let read = tokio::select! {
                read = reader.read_until(b'\n', &mut frame) => read?,
                Some(joined) = calls.join_next(), if !calls.is_empty() => {
                    if let Err(e) = joined {
                        warn!("Tool call task failed: {}", e);
                    }
                    continue;
                }
            };
            if read == 0 && frame.is_empty() {
                break;
            }
            let line = std::mem::take(&mut frame);
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let request: RpcRequest = match serde_json::from_slice(&line) {
                Ok(request) => request,
                Err(e) => {
                    warn!("Failed to parse request: {}", e);
                    let _ = tx.send(RpcResponse::error(None, PARSE_ERROR, "Parse error"));
                    continue;
                }
            };

            // Notifications get no response.
            let Some(id) = request.id.clone() else {
                debug!("Notification: {}", request.method);
                continue;
            };

            let response = match request.method.as_str() {
                METHOD_INITIALIZE => {
                    initialized = true;
                    self.initialize(id)
                }
                METHOD_TOOLS_LIST | METHOD_TOOLS_CALL if !initialized => {
                    RpcResponse::error(Some(id), NOT_INITIALIZED, "Server not initialized")
                }
                METHOD_TOOLS_LIST => self.tools_list(id),
                METHOD_TOOLS_CALL => {
                    let params: ToolCallParams =
                        match serde_json::from_value(request.params.unwrap_or(Value::Null)) {
                            Ok(params) => params,
                            Err(e) => {
                                let message = format!("Invalid params: {}", e);
                                let _ = tx.send(RpcResponse::error(Some(id), INVALID_PARAMS, &message));
                                continue;
                            }
                        };

                    let engine = Arc::clone(&self.engine);
                    let catalog = Arc::clone(&self.catalog);
                    let tx = tx.clone();
                    calls.spawn(async move {
                        let outcome = call_tool(engine.as_ref(), &catalog, params).await;
                        let result = ToolCallResult::from(outcome);
                        let response = match serde_json::to_value(result) {
                            Ok(value) => RpcResponse::success(Some(id), value),
                            Err(e) => RpcResponse::error(Some(id), INTERNAL_ERROR, &e.to_string()),
                        };
                        let _ = tx.send(response);
                    });
                    continue;
                }
                other => RpcResponse::error(
                    Some(id),
                    METHOD_NOT_FOUND,
                    &format!("Method not found: {}", other),
                ),
            };

            let _ = tx.send(response);
        }

        info!("Input closed; stopping worker");
        calls.shutdown().await;
        drop(tx);

        match writer_task.await {
            Ok(result) => result,
            Err(e) => {
                warn!("Response writer failed: {}", e);
                Ok(())
            }
        }
    }

    fn initialize(&self, id: Value) -> RpcResponse {
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            server_info: PeerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: ServerCapabilities {
                tools: ToolsCapability {
                    list_changed: false,
                },
            },
        };
        to_response(id, &result)
    }

    fn tools_list(&self, id: Value) -> RpcResponse {
        let result = ToolsListResult {
            tools: self.catalog.to_vec(),
        };
        to_response(id, &result)
    }
}

fn to_response<T: serde::Serialize>(id: Value, result: &T) -> RpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => RpcResponse::success(Some(id), value),
        Err(e) => RpcResponse::error(Some(id), INTERNAL_ERROR, &e.to_string()),
    }
}

/// Validate and run one call. Every failure becomes a failure outcome.
async fn call_tool(
    engine: &dyn MediaEngine,
    catalog: &[ToolDescriptor],
    params: ToolCallParams,
) -> Outcome {
    let Some(descriptor) = catalog.iter().find(|t| t.name == params.name) else {
        return Outcome::Failure(format!("unknown tool: {}", params.name));
    };

    let arguments = match descriptor.bind(&params.arguments.unwrap_or(Value::Null)) {
        Ok(arguments) => arguments,
        Err(e) => return Outcome::Failure(e.to_string()),
    };

    debug!(tool = %params.name, "Executing");
    match engine.execute(&params.name, &arguments).await {
        Ok(location) => Outcome::Success(location),
        Err(e) => {
            warn!(tool = %params.name, "{}", e);
            Outcome::Failure(e.to_string())
        }
    }
}

async fn write_responses<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<RpcResponse>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = serde_json::to_vec(&response)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
    }
    Ok(())
}
