//! Uniform callables over discovered tools.

use super::channel::DispatchChannel;
use super::invocation::{Invocation, Outcome};
use super::registry::ToolRegistry;
use super::schema::ToolDescriptor;
use crate::error::{Result, SpliceError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One tool bound to a channel.
///
/// Holds its own copy of the descriptor, so the tool name it sends is fixed
/// when the proxy is built.
#[derive(Clone)]
pub struct ToolProxy {
    descriptor: ToolDescriptor,
    channel: Arc<DispatchChannel>,
    timeout: Option<Duration>,
}

impl ToolProxy {
    pub fn new(
        descriptor: ToolDescriptor,
        channel: Arc<DispatchChannel>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            descriptor,
            channel,
            timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    /// Validate, send and await one call.
    ///
    /// Invalid arguments and timeouts come back as `Ok(Outcome::Failure)`;
    /// invalid arguments never reach the worker. `Err` is reserved for
    /// transport and protocol errors.
    pub async fn invoke(&self, arguments: &Value) -> Result<Outcome> {
        let bound = match self.descriptor.bind(arguments) {
            Ok(bound) => bound,
            Err(e) => {
                debug!(tool = %self.descriptor.name, "Rejected locally: {}", e);
                return Ok(Outcome::Failure(e.to_string()));
            }
        };

        let invocation =
            Invocation::new(self.descriptor.name.clone(), bound).with_timeout(self.timeout);
        let pending = self.channel.send(invocation).await?;

        match pending.wait().await {
            Ok(result) => Ok(result.outcome),
            Err(e @ SpliceError::Timeout { .. }) => Ok(Outcome::Failure(e.to_string())),
            Err(e) => Err(e),
        }
    }
}

/// All proxies built from one discovery cycle.
#[derive(Clone, Default)]
pub struct ProxySet {
    proxies: Vec<ToolProxy>,
    index: HashMap<String, usize>,
}

impl ProxySet {
    /// Build one proxy per registry entry.
    pub fn build(
        registry: &ToolRegistry,
        channel: Arc<DispatchChannel>,
        timeout: Option<Duration>,
    ) -> Self {
        let proxies: Vec<ToolProxy> = registry
            .descriptors()
            .iter()
            .map(|d| ToolProxy::new(d.clone(), Arc::clone(&channel), timeout))
            .collect();
        let index = proxies
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name().to_string(), i))
            .collect();
        Self { proxies, index }
    }

    pub fn get(&self, name: &str) -> Option<&ToolProxy> {
        self.index.get(name).map(|&i| &self.proxies[i])
    }

    /// Invoke a tool by name. Unknown names fail without wire traffic.
    pub async fn invoke(&self, name: &str, arguments: &Value) -> Result<Outcome> {
        match self.get(name) {
            Some(proxy) => proxy.invoke(arguments).await,
            None => Ok(Outcome::Failure(
                SpliceError::UnknownTool(name.to_string()).to_string(),
            )),
        }
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.proxies.iter().map(|p| p.descriptor.clone()).collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.proxies.iter().map(ToolProxy::name)
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::channel::ChannelOptions;
    use crate::error::TransportError;
    use crate::test_support::{connect_in_process, ScriptedEngine};
    use serde_json::json;

    async fn proxies(engine: Arc<ScriptedEngine>, timeout: Option<Duration>) -> (Arc<DispatchChannel>, ProxySet) {
        let channel = Arc::new(connect_in_process(engine, ChannelOptions::default()).await);
        let registry = ToolRegistry::discover(&channel).await.unwrap();
        let set = ProxySet::build(&registry, Arc::clone(&channel), timeout);
        (channel, set)
    }

    #[tokio::test]
    async fn test_trim_video_succeeds_with_new_path() {
        let (_channel, set) = proxies(Arc::new(ScriptedEngine::new()), None).await;

        let outcome = set
            .invoke(
                "trim_video",
                &json!({"input_path": "a.mp4", "start_time": "00:00:05", "end_time": "00:00:10"}),
            )
            .await
            .unwrap();

        match outcome {
            Outcome::Success(path) => {
                assert!(!path.is_empty());
                assert_ne!(path, "a.mp4");
            }
            Outcome::Failure(reason) => panic!("unexpected failure: {}", reason),
        }
    }

    #[tokio::test]
    async fn test_defaults_filled_before_sending() {
        let engine = Arc::new(ScriptedEngine::new());
        let (_channel, set) = proxies(Arc::clone(&engine), None).await;

        set.invoke("extract_audio", &json!({"input_path": "a.mp4"}))
            .await
            .unwrap();

        let calls = engine.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "extract_audio");
        assert_eq!(calls[0].1["output_name"], json!("extracted_audio.mp3"));
    }

    #[tokio::test]
    async fn test_missing_required_argument_sends_nothing() {
        let (channel, set) = proxies(Arc::new(ScriptedEngine::new()), None).await;
        let frames_before = channel.frames_sent();

        let outcome = set
            .invoke("trim_video", &json!({"input_path": "a.mp4"}))
            .await
            .unwrap();

        assert!(!outcome.is_success());
        assert!(outcome.text().contains("start_time"));
        assert_eq!(channel.frames_sent(), frames_before);
    }

    #[tokio::test]
    async fn test_unknown_tool_sends_nothing() {
        let (channel, set) = proxies(Arc::new(ScriptedEngine::new()), None).await;
        let frames_before = channel.frames_sent();

        let outcome = set.invoke("does_not_exist", &json!({})).await.unwrap();

        assert_eq!(outcome, Outcome::Failure("unknown tool: does_not_exist".to_string()));
        assert_eq!(channel.frames_sent(), frames_before);
    }

    #[tokio::test]
    async fn test_each_proxy_calls_its_own_tool() {
        let engine = Arc::new(ScriptedEngine::new());
        let (_channel, set) = proxies(Arc::clone(&engine), None).await;

        let trim = set.get("trim_video").unwrap().clone();
        let audio = set.get("extract_audio").unwrap().clone();
        audio.invoke(&json!({"input_path": "a.mp4"})).await.unwrap();
        trim.invoke(&json!({"input_path": "a.mp4", "start_time": "1", "end_time": "2"}))
            .await
            .unwrap();

        let names: Vec<String> = engine.calls().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["extract_audio", "trim_video"]);
    }

    #[tokio::test]
    async fn test_concurrent_calls_to_different_tools() {
        let engine = Arc::new(
            ScriptedEngine::new()
                .with_delay("trim_video", Duration::from_millis(200))
                .with_delay("extract_audio", Duration::from_millis(10)),
        );
        let (_channel, set) = proxies(engine, None).await;

        let trim_args = json!({"input_path": "a.mp4", "start_time": "1", "end_time": "2"});
        let audio_args = json!({"input_path": "b.mp4"});
        let (trim, audio) = tokio::join!(
            set.invoke("trim_video", &trim_args),
            set.invoke("extract_audio", &audio_args),
        );

        assert!(trim.unwrap().is_success());
        assert!(audio.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_operation_failure_is_outcome() {
        let engine = Arc::new(ScriptedEngine::new().with_failure("mute_video_audio", "Error muting video: boom"));
        let (_channel, set) = proxies(engine, None).await;

        let outcome = set
            .invoke("mute_video_audio", &json!({"input_path": "a.mp4"}))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Failure("Error muting video: boom".to_string()));
    }

    #[tokio::test]
    async fn test_timeout_is_failure_outcome() {
        let engine = Arc::new(ScriptedEngine::new().with_delay("extract_audio", Duration::from_secs(5)));
        let (channel, set) = proxies(engine, Some(Duration::from_millis(50))).await;

        let outcome = set
            .invoke("extract_audio", &json!({"input_path": "a.mp4"}))
            .await
            .unwrap();
        assert!(!outcome.is_success());
        assert!(outcome.text().contains("timed out"));
        assert!(!channel.is_closed());
    }

    #[tokio::test]
    async fn test_closed_channel_is_error() {
        let (channel, set) = proxies(Arc::new(ScriptedEngine::new()), None).await;
        channel.close().await;

        let err = set
            .invoke("extract_audio", &json!({"input_path": "a.mp4"}))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, SpliceError::Transport(TransportError::ChannelClosed)));
    }
}
