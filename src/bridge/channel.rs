//! Dispatch channel to a worker process.
//!
//! Requests are written as single-line JSON-RPC frames to the worker's stdin;
//! a reader task routes each response line back to its waiter by correlation
//! id. Any number of invocations (up to `max_in_flight`) may be outstanding at
//! once and they complete in whatever order the worker finishes them.
//!
//! When the worker's output ends, a frame fails to parse, or the channel is
//! closed explicitly, every pending waiter is failed with the closing reason
//! and every later call fails immediately.

use super::invocation::{CorrelationId, Invocation, InvocationResult, Outcome};
use super::protocol::{
    InitializeParams, InitializeResult, PeerInfo, RpcRequest, RpcResponse, ToolCallParams,
    ToolCallResult, ToolsListResult, METHOD_INITIALIZE, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
    PROTOCOL_VERSION,
};
use super::schema::ToolDescriptor;
use crate::error::{ProtocolError, Result, SpliceError, TransportError};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Reply = std::result::Result<RpcResponse, TransportError>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// How long `close` waits for the worker to exit after killing it.
const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Command line used to launch a worker process.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl std::fmt::Display for WorkerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Channel tuning knobs.
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// Maximum concurrently outstanding tool invocations (at least 1).
    pub max_in_flight: usize,
    /// Limit for the handshake and discovery round trips.
    pub handshake_timeout: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Opening,
    Ready,
    Discovering,
    Discovered,
}

#[derive(Default)]
struct PendingTable {
    waiters: HashMap<CorrelationId, oneshot::Sender<Reply>>,
    closed: Option<TransportError>,
}

/// State shared between the channel, its reader task and pending calls.
struct Shared {
    table: Mutex<PendingTable>,
    in_flight: Arc<Semaphore>,
    child: Mutex<Option<Child>>,
}

impl Shared {
    fn table(&self) -> MutexGuard<'_, PendingTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn child(&self) -> MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, id: &CorrelationId) -> Result<oneshot::Receiver<Reply>> {
        let mut table = self.table();
        if let Some(reason) = &table.closed {
            return Err(reason.clone().into());
        }
        if table.waiters.contains_key(id) {
            return Err(ProtocolError::DuplicateCorrelation(id.to_string()).into());
        }
        let (tx, rx) = oneshot::channel();
        table.waiters.insert(id.clone(), tx);
        Ok(rx)
    }

    fn complete(&self, id: &CorrelationId, response: RpcResponse) {
        let waiter = self.table().waiters.remove(id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(Ok(response));
            }
            None => warn!(%id, "Dropping late response for abandoned invocation"),
        }
    }

    fn abandon(&self, id: &CorrelationId) {
        self.table().waiters.remove(id);
    }

    fn closed_reason(&self) -> Option<TransportError> {
        self.table().closed.clone()
    }

    /// Close the channel once; later calls are no-ops.
    fn shutdown(&self, reason: TransportError) {
        let waiters = {
            let mut table = self.table();
            if table.closed.is_some() {
                return;
            }
            table.closed = Some(reason.clone());
            std::mem::take(&mut table.waiters)
        };

        self.in_flight.close();

        if !waiters.is_empty() {
            info!("Failing {} pending invocation(s): {}", waiters.len(), reason);
        }
        for (_, tx) in waiters {
            let _ = tx.send(Err(reason.clone()));
        }

        if let Some(child) = self.child().as_mut() {
            if let Err(e) = child.start_kill() {
                debug!("Worker already gone: {}", e);
            }
        }
    }
}

/// A multiplexed request/response channel to one worker.
pub struct DispatchChannel {
    shared: Arc<Shared>,
    writer: tokio::sync::Mutex<BoxedWriter>,
    phase: Mutex<Phase>,
    options: ChannelOptions,
    frames_sent: AtomicU64,
    server_info: OnceLock<PeerInfo>,
    reader_task: JoinHandle<()>,
}

impl DispatchChannel {
    /// Spawn the worker and complete the handshake.
    pub async fn open(command: &WorkerCommand, options: ChannelOptions) -> Result<Self> {
        info!("Starting worker: {}", command);

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TransportError::WorkerUnavailable(format!("failed to start '{}': {}", command, e))
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::WorkerUnavailable("worker stdin unavailable".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::WorkerUnavailable("worker stdout unavailable".to_string())
        })?;
        if let Some(stderr) = child.stderr.take() {
            forward_stderr(stderr);
        }

        Self::connect(stdout, stdin, Some(child), options).await
    }

    /// Build a channel over an existing pair of streams and perform the
    /// handshake. `child`, if given, is killed when the channel closes.
    pub async fn connect<R, W>(
        reader: R,
        writer: W,
        child: Option<Child>,
        options: ChannelOptions,
    ) -> Result<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let shared = Arc::new(Shared {
            table: Mutex::new(PendingTable::default()),
            in_flight: Arc::new(Semaphore::new(options.max_in_flight.max(1))),
            child: Mutex::new(child),
        });

        let reader_task = tokio::spawn(read_frames(reader, Arc::clone(&shared)));

        let channel = Self {
            shared,
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            phase: Mutex::new(Phase::Opening),
            options,
            frames_sent: AtomicU64::new(0),
            server_info: OnceLock::new(),
            reader_task,
        };

        match channel.handshake().await {
            Ok(info) => {
                info!("Connected to worker {} {}", info.name, info.version);
                let _ = channel.server_info.set(info);
                *channel.phase() = Phase::Ready;
                Ok(channel)
            }
            Err(e) => {
                channel.shared.shutdown(TransportError::ChannelClosed);
                Err(TransportError::WorkerUnavailable(format!("handshake failed: {}", e)).into())
            }
        }
    }

    /// Send a tool invocation.
    ///
    /// Resolves once the request frame is written (waiting for an in-flight
    /// slot if the limit is reached). The returned handle yields the result.
    pub async fn send(&self, invocation: Invocation) -> Result<PendingInvocation> {
        if *self.phase() != Phase::Discovered {
            return Err(ProtocolError::NotDiscovered.into());
        }
        if let Some(reason) = self.shared.closed_reason() {
            return Err(reason.into());
        }

        let Invocation {
            correlation_id,
            tool_name,
            arguments,
            timeout,
        } = invocation;

        let params = serde_json::to_value(ToolCallParams {
            name: tool_name.clone(),
            arguments: Some(Value::Object(arguments)),
        })?;
        let frame = RpcRequest::new(
            Value::String(correlation_id.to_string()),
            METHOD_TOOLS_CALL,
            params,
        );

        let permit = Arc::clone(&self.shared.in_flight)
            .acquire_owned()
            .await
            .map_err(|_| self.closed_error())?;

        let rx = self.shared.register(&correlation_id)?;
        if let Err(e) = self.write_frame(&frame).await {
            self.shared.abandon(&correlation_id);
            return Err(e);
        }

        debug!(id = %correlation_id, tool = %tool_name, "Invocation sent");

        Ok(PendingInvocation {
            correlation_id,
            tool_name,
            timeout,
            rx,
            shared: Arc::clone(&self.shared),
            settled: false,
            _permit: permit,
        })
    }

    /// Run tool discovery, handing the descriptors to `build`.
    ///
    /// Allowed exactly once per channel. The channel only starts accepting
    /// invocations if `build` accepts the catalog.
    pub(crate) async fn discover_with<T>(
        &self,
        build: impl FnOnce(Vec<ToolDescriptor>) -> Result<T>,
    ) -> Result<T> {
        {
            let mut phase = self.phase();
            match *phase {
                Phase::Ready => *phase = Phase::Discovering,
                Phase::Discovering | Phase::Discovered => {
                    return Err(ProtocolError::DiscoveryRepeated.into())
                }
                Phase::Opening => return Err(ProtocolError::NotDiscovered.into()),
            }
        }

        let response = self
            .request(
                METHOD_TOOLS_LIST,
                json!({}),
                Some(self.options.handshake_timeout),
            )
            .await?;
        let listed: ToolsListResult = expect_result(METHOD_TOOLS_LIST, response)?;
        let built = build(listed.tools)?;

        *self.phase() = Phase::Discovered;
        Ok(built)
    }

    /// Terminate the worker and fail every pending invocation with
    /// [`TransportError::ChannelClosed`].
    pub async fn close(&self) {
        self.shared.shutdown(TransportError::ChannelClosed);
        self.reader_task.abort();

        let child = self.shared.child().take();
        if let Some(mut child) = child {
            match tokio::time::timeout(REAP_TIMEOUT, child.wait()).await {
                Ok(Ok(status)) => debug!("Worker exited: {}", status),
                Ok(Err(e)) => warn!("Failed to reap worker: {}", e),
                Err(_) => warn!("Worker did not exit within {:?}", REAP_TIMEOUT),
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed_reason().is_some()
    }

    /// Number of frames written to the worker so far.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::SeqCst)
    }

    /// Number of invocations still awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.shared.table().waiters.len()
    }

    pub fn server_info(&self) -> Option<&PeerInfo> {
        self.server_info.get()
    }

    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn closed_error(&self) -> SpliceError {
        self.shared
            .closed_reason()
            .unwrap_or(TransportError::ChannelClosed)
            .into()
    }

    async fn handshake(&self) -> Result<PeerInfo> {
        let params = serde_json::to_value(InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            client_info: PeerInfo::this_crate(),
        })?;
        let response = self
            .request(METHOD_INITIALIZE, params, Some(self.options.handshake_timeout))
            .await?;
        let result: InitializeResult = expect_result(METHOD_INITIALIZE, response)?;
        Ok(result.server_info)
    }

    /// Control-plane round trip (handshake, discovery).
    async fn request(
        &self,
        method: &str,
        params: Value,
        limit: Option<Duration>,
    ) -> Result<RpcResponse> {
        let id = CorrelationId::new();
        let frame = RpcRequest::new(Value::String(id.to_string()), method, params);

        let rx = self.shared.register(&id)?;
        if let Err(e) = self.write_frame(&frame).await {
            self.shared.abandon(&id);
            return Err(e);
        }

        let reply = match limit {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    self.shared.abandon(&id);
                    return Err(SpliceError::Timeout {
                        tool: method.to_string(),
                        after: limit,
                    });
                }
            },
            None => rx.await,
        };

        match reply {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(reason)) => Err(reason.into()),
            Err(_) => Err(TransportError::ChannelClosed.into()),
        }
    }

    async fn write_frame(&self, frame: &RpcRequest) -> Result<()> {
        let mut line = serde_json::to_vec(frame)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        if let Err(e) = write_line(&mut writer, &line).await {
            warn!("Failed to write to worker: {}", e);
            self.shared.shutdown(TransportError::ChannelClosed);
            return Err(TransportError::ChannelClosed.into());
        }

        self.frames_sent.fetch_add(1, Ordering::SeqCst);
        debug!(method = %frame.method, "Frame sent");
        Ok(())
    }
}

impl Drop for DispatchChannel {
    fn drop(&mut self) {
        self.shared.shutdown(TransportError::ChannelClosed);
        self.reader_task.abort();
    }
}

/// Handle to an invocation awaiting its response.
///
/// Dropping the handle, or letting its timeout expire, abandons the wait only.
/// The worker keeps running the operation and its eventual response is
/// discarded.
pub struct PendingInvocation {
    correlation_id: CorrelationId,
    tool_name: String,
    timeout: Option<Duration>,
    rx: oneshot::Receiver<Reply>,
    shared: Arc<Shared>,
    settled: bool,
    _permit: OwnedSemaphorePermit,
}

impl PendingInvocation {
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Wait for the result.
    ///
    /// Transport failures and timeouts are returned as errors; failures
    /// reported by the worker arrive as [`Outcome::Failure`].
    pub async fn wait(mut self) -> Result<InvocationResult> {
        let received = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut self.rx).await {
                Ok(received) => received,
                Err(_) => {
                    warn!(
                        id = %self.correlation_id,
                        "'{}' timed out after {:?}; abandoning wait",
                        self.tool_name,
                        limit
                    );
                    return Err(SpliceError::Timeout {
                        tool: self.tool_name.clone(),
                        after: limit,
                    });
                }
            },
            None => (&mut self.rx).await,
        };
        self.settled = true;

        let response = match received {
            Ok(Ok(response)) => response,
            Ok(Err(reason)) => return Err(reason.into()),
            Err(_) => return Err(TransportError::ChannelClosed.into()),
        };

        Ok(InvocationResult {
            correlation_id: self.correlation_id.clone(),
            outcome: decode_outcome(response),
        })
    }

    /// Wait for the result, folding every error into a failure outcome.
    pub async fn outcome(self) -> InvocationResult {
        let correlation_id = self.correlation_id.clone();
        match self.wait().await {
            Ok(result) => result,
            Err(e) => InvocationResult {
                correlation_id,
                outcome: Outcome::Failure(e.to_string()),
            },
        }
    }
}

impl Drop for PendingInvocation {
    fn drop(&mut self) {
        if !self.settled {
            self.shared.abandon(&self.correlation_id);
        }
    }
}

async fn write_line(writer: &mut BoxedWriter, line: &[u8]) -> std::io::Result<()> {
    writer.write_all(line).await?;
    writer.flush().await
}

/// Route response frames to their waiters until the stream ends or breaks.
async fn read_frames<R>(reader: R, shared: Arc<Shared>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut frame = Vec::new();

    let reason = loop {
        frame.clear();
        match reader.read_until(b'\n', &mut frame).await {
            Ok(0) => {
                info!("Worker closed its output");
                break TransportError::ChannelClosed;
            }
            Ok(_) => {
                if frame.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                match parse_response(&frame) {
                    Some((id, response)) => shared.complete(&id, response),
                    None => {
                        warn!(
                            "Malformed frame from worker: {}",
                            truncate(&String::from_utf8_lossy(&frame), 200)
                        );
                        break TransportError::MalformedMessage;
                    }
                }
            }
            Err(e) => {
                warn!("Failed to read from worker: {}", e);
                break TransportError::ChannelClosed;
            }
        }
    };

    shared.shutdown(reason);
}

fn parse_response(frame: &[u8]) -> Option<(CorrelationId, RpcResponse)> {
    let response: RpcResponse = serde_json::from_slice(frame).ok()?;
    let id: CorrelationId = serde_json::from_value(response.id.clone()?).ok()?;
    Some((id, response))
}

fn decode_outcome(response: RpcResponse) -> Outcome {
    if let Some(error) = response.error {
        return Outcome::Failure(error.message);
    }
    match response.result.map(serde_json::from_value::<ToolCallResult>) {
        Some(Ok(result)) => result.into(),
        _ => Outcome::Failure(TransportError::MalformedMessage.to_string()),
    }
}

fn expect_result<T: DeserializeOwned>(method: &str, response: RpcResponse) -> Result<T> {
    if let Some(error) = response.error {
        return Err(ProtocolError::Rejected {
            method: method.to_string(),
            code: error.code,
            message: error.message,
        }
        .into());
    }
    let result = response.result.ok_or_else(|| ProtocolError::UnexpectedReply {
        method: method.to_string(),
        reason: "missing result".to_string(),
    })?;
    serde_json::from_value(result).map_err(|e| {
        ProtocolError::UnexpectedReply {
            method: method.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

fn forward_stderr(stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if !line.trim().is_empty() {
                debug!("worker: {}", line);
            }
        }
    });
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    }
}
