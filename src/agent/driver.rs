//! Planning loop driver.
//!
//! Takes operator input one line at a time, lets the planner pick tools,
//! runs them through the session's proxies and reports the final answer.
//! Tool failures are fed back to the planner as text; only transport and
//! protocol errors end an intent early.

use super::planner::{PlanStep, Planner, ToolSelection, Turn};
use super::session::{Connector, Session};
use crate::bridge::{Outcome, ProxySet};
use crate::config::{Execution, Settings};
use crate::error::{Result, TransportError};
use futures::future::join_all;
use tracing::{debug, info, warn};

/// Where the driver is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    AwaitingIntent,
    Planning,
    ExecutingTool,
    Terminated,
}

/// Result of handling one line of operator input.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverReply {
    /// Final answer to an intent.
    Response(String),
    /// The intent ended early; the text explains why.
    Failure(String),
    /// History was cleared.
    Cleared,
    /// Input was blank.
    Empty,
    /// The operator asked to leave.
    Terminated,
}

/// Progress notifications for the operator surface.
#[derive(Debug, Clone)]
pub enum DriverEvent<'a> {
    Planning,
    ToolStarted(&'a ToolSelection),
    ToolFinished(&'a ToolSelection, &'a Outcome),
    Reconnecting(u32),
}

#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub execution: Execution,
    pub history_limit: usize,
    pub max_iterations: usize,
    pub max_reconnects: u32,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            execution: Execution::Sequential,
            history_limit: 40,
            max_iterations: 10,
            max_reconnects: 2,
        }
    }
}

impl From<&Settings> for DriverOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            execution: settings.driver.execution,
            history_limit: settings.driver.history_limit,
            max_iterations: settings.planner.max_iterations,
            max_reconnects: settings.driver.max_reconnects,
        }
    }
}

type Observer = Box<dyn Fn(DriverEvent<'_>) + Send + Sync>;

/// Drives the operator ↔ planner ↔ tools loop over one [`Session`] at a time.
pub struct Driver {
    planner: Box<dyn Planner>,
    connector: Box<dyn Connector>,
    session: Option<Session>,
    history: Vec<Turn>,
    state: DriverState,
    options: DriverOptions,
    reconnects: u32,
    observer: Option<Observer>,
}

/// Whether `input` asks to end the loop.
pub fn is_termination(input: &str) -> bool {
    matches!(
        input.trim().to_lowercase().as_str(),
        "quit" | "exit" | "q"
    )
}

impl Driver {
    pub fn new(
        planner: Box<dyn Planner>,
        connector: Box<dyn Connector>,
        options: DriverOptions,
    ) -> Self {
        Self {
            planner,
            connector,
            session: None,
            history: Vec::new(),
            state: DriverState::Idle,
            options,
            reconnects: 0,
            observer: None,
        }
    }

    /// Receive progress events.
    pub fn with_observer(mut self, observer: impl Fn(DriverEvent<'_>) + Send + Sync + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Open the first session.
    pub async fn start(&mut self) -> Result<()> {
        self.session = Some(self.connector.connect().await?);
        Ok(())
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Mark the driver as waiting on the operator.
    pub fn await_intent(&mut self) {
        if self.state != DriverState::Terminated {
            self.state = DriverState::AwaitingIntent;
        }
    }

    /// Handle one line of operator input.
    pub async fn handle_input(&mut self, input: &str) -> DriverReply {
        let input = input.trim();
        if self.state == DriverState::Terminated {
            return DriverReply::Terminated;
        }
        if is_termination(input) {
            self.state = DriverState::Terminated;
            return DriverReply::Terminated;
        }
        if input.is_empty() {
            self.state = DriverState::Idle;
            return DriverReply::Empty;
        }
        if input.eq_ignore_ascii_case("clear") {
            self.history.clear();
            self.state = DriverState::Idle;
            return DriverReply::Cleared;
        }

        let checkpoint = self.history.len();
        let reply = match self.run_intent(input).await {
            Ok(text) => DriverReply::Response(text),
            Err(e) => {
                warn!("Intent failed: {}", e);
                self.history.truncate(checkpoint);
                DriverReply::Failure(e.to_string())
            }
        };

        self.trim_history();
        self.state = DriverState::Idle;
        reply
    }

    /// Close the current session.
    pub async fn shutdown(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
        self.state = DriverState::Terminated;
    }

    async fn run_intent(&mut self, intent: &str) -> Result<String> {
        self.ensure_session().await?;
        self.history.push(Turn::User(intent.to_string()));

        for iteration in 1..=self.options.max_iterations {
            self.state = DriverState::Planning;
            self.notify(DriverEvent::Planning);
            debug!("Planning iteration {}", iteration);

            let session = self.session.as_ref().ok_or(TransportError::ChannelClosed)?;
            let step = self.planner.plan(&self.history, session.tools()).await?;

            let selections = match step {
                PlanStep::Respond(text) => {
                    self.history.push(Turn::Assistant(text.clone()));
                    return Ok(text);
                }
                PlanStep::Invoke(selections) => selections,
            };

            self.state = DriverState::ExecutingTool;
            self.history.push(Turn::ToolRequests(selections.clone()));

            let outcomes = execute_selections(
                session.proxies(),
                &selections,
                self.options.execution,
                self.observer.as_deref(),
            )
            .await?;

            for (selection, outcome) in selections.iter().zip(outcomes) {
                self.history.push(Turn::ToolResult {
                    call_id: selection.call_id.clone(),
                    content: outcome.to_string(),
                });
            }
        }

        let text = format!(
            "Stopped after {} planning steps without a final answer.",
            self.options.max_iterations
        );
        self.history.push(Turn::Assistant(text.clone()));
        Ok(text)
    }

    /// Reopen the worker if its channel has closed, within the reconnect budget.
    async fn ensure_session(&mut self) -> Result<()> {
        match &self.session {
            Some(session) if !session.is_closed() => return Ok(()),
            Some(session) => session.close().await,
            None => {}
        }
        self.session = None;

        if self.reconnects >= self.options.max_reconnects {
            return Err(TransportError::WorkerUnavailable(format!(
                "worker channel closed and reconnect limit ({}) reached",
                self.options.max_reconnects
            ))
            .into());
        }

        self.reconnects += 1;
        self.notify(DriverEvent::Reconnecting(self.reconnects));
        info!(
            "Reconnecting to worker (attempt {}/{})",
            self.reconnects, self.options.max_reconnects
        );
        self.session = Some(self.connector.connect().await?);
        Ok(())
    }

    /// Drop old turns down to `history_limit`, cutting only at user turns.
    fn trim_history(&mut self) {
        let limit = self.options.history_limit;
        if self.history.len() <= limit {
            return;
        }
        let is_user = |turn: &Turn| matches!(turn, Turn::User(_));
        let earliest = self.history.len() - limit;
        // Never split the latest intent, even when it alone exceeds the limit.
        let start = self.history[earliest..]
            .iter()
            .position(is_user)
            .map(|i| earliest + i)
            .or_else(|| self.history.iter().rposition(is_user))
            .unwrap_or(self.history.len());
        self.history.drain(..start);
    }

    fn notify(&self, event: DriverEvent<'_>) {
        if let Some(observer) = &self.observer {
            observer(event);
        }
    }
}

/// Run one batch of selections. Stops at the first fatal error.
async fn execute_selections(
    proxies: &ProxySet,
    selections: &[ToolSelection],
    execution: Execution,
    observer: Option<&(dyn Fn(DriverEvent<'_>) + Send + Sync)>,
) -> Result<Vec<Outcome>> {
    let notify = |event: DriverEvent<'_>| {
        if let Some(observer) = observer {
            observer(event);
        }
    };

    let results: Vec<Result<Outcome>> = match execution {
        Execution::Sequential => {
            let mut results = Vec::with_capacity(selections.len());
            for selection in selections {
                notify(DriverEvent::ToolStarted(selection));
                let result = invoke(proxies, selection).await;
                let fatal = result.is_err();
                results.push(result);
                if fatal {
                    break;
                }
            }
            results
        }
        Execution::Concurrent => {
            for selection in selections {
                notify(DriverEvent::ToolStarted(selection));
            }
            join_all(selections.iter().map(|s| invoke(proxies, s))).await
        }
    };

    let mut outcomes = Vec::with_capacity(results.len());
    for (selection, result) in selections.iter().zip(results) {
        let outcome = result?;
        notify(DriverEvent::ToolFinished(selection, &outcome));
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

async fn invoke(proxies: &ProxySet, selection: &ToolSelection) -> Result<Outcome> {
    info!("Calling tool: {}", selection);
    match proxies
        .invoke(&selection.tool_name, &selection.normalized_arguments())
        .await
    {
        Ok(outcome) => Ok(outcome),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => Ok(Outcome::Failure(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{ChannelOptions, ToolDescriptor};
    use crate::error::SpliceError;
    use crate::test_support::{connect_in_process, ScriptedEngine};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Planner that replays a fixed list of steps and records what it saw.
    struct ScriptedPlanner {
        steps: Mutex<VecDeque<PlanStep>>,
        seen: Arc<Mutex<Vec<Vec<Turn>>>>,
    }

    impl ScriptedPlanner {
        fn new(steps: Vec<PlanStep>) -> (Self, Arc<Mutex<Vec<Vec<Turn>>>>) {
            let seen = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    steps: Mutex::new(steps.into()),
                    seen: Arc::clone(&seen),
                },
                seen,
            )
        }
    }

    #[async_trait]
    impl Planner for ScriptedPlanner {
        async fn plan(&self, history: &[Turn], _tools: &[ToolDescriptor]) -> Result<PlanStep> {
            self.seen.lock().unwrap().push(history.to_vec());
            self.steps
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| SpliceError::Planner("script exhausted".to_string()))
        }
    }

    struct InProcessConnector {
        engine: Arc<ScriptedEngine>,
        connects: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connector for InProcessConnector {
        async fn connect(&self) -> Result<Session> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let channel = connect_in_process(self.engine.clone(), ChannelOptions::default()).await;
            Session::establish(channel, None).await
        }
    }

    fn select(call_id: &str, tool: &str, arguments: Value) -> ToolSelection {
        ToolSelection {
            call_id: call_id.to_string(),
            tool_name: tool.to_string(),
            arguments,
        }
    }

    fn trim_selection(call_id: &str) -> ToolSelection {
        select(
            call_id,
            "trim_video",
            json!({"input_path": "a.mp4", "start_time": "00:00:05", "end_time": "00:00:10"}),
        )
    }

    async fn driver(
        steps: Vec<PlanStep>,
        engine: Arc<ScriptedEngine>,
        options: DriverOptions,
    ) -> (Driver, Arc<Mutex<Vec<Vec<Turn>>>>, Arc<AtomicUsize>) {
        let (planner, seen) = ScriptedPlanner::new(steps);
        let connects = Arc::new(AtomicUsize::new(0));
        let connector = InProcessConnector {
            engine,
            connects: Arc::clone(&connects),
        };
        let mut driver = Driver::new(Box::new(planner), Box::new(connector), options);
        driver.start().await.unwrap();
        (driver, seen, connects)
    }

    #[test]
    fn test_termination_words() {
        for word in ["quit", "EXIT", "Q", "  exit  "] {
            assert!(is_termination(word), "{}", word);
        }
        for word in ["quite", "trim then quit", ""] {
            assert!(!is_termination(word), "{}", word);
        }
    }

    #[tokio::test]
    async fn test_quit_ends_loop_without_invocations() {
        let engine = Arc::new(ScriptedEngine::new());
        let (mut driver, seen, _) = driver(Vec::new(), Arc::clone(&engine), DriverOptions::default()).await;

        driver.await_intent();
        assert_eq!(driver.state(), DriverState::AwaitingIntent);
        assert_eq!(driver.handle_input("Quit").await, DriverReply::Terminated);
        assert_eq!(driver.state(), DriverState::Terminated);
        assert_eq!(driver.handle_input("trim a.mp4").await, DriverReply::Terminated);

        assert!(engine.calls().is_empty());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_intent_runs_tool_then_responds() {
        let engine = Arc::new(ScriptedEngine::new());
        let steps = vec![
            PlanStep::Invoke(vec![trim_selection("call_1")]),
            PlanStep::Respond("Trimmed to /outputs/trimmed_video.mp4".to_string()),
        ];
        let (mut driver, seen, _) = driver(steps, Arc::clone(&engine), DriverOptions::default()).await;

        let reply = driver.handle_input("trim a.mp4 from 5s to 10s").await;

        assert_eq!(
            reply,
            DriverReply::Response("Trimmed to /outputs/trimmed_video.mp4".to_string())
        );
        assert_eq!(driver.state(), DriverState::Idle);
        assert_eq!(engine.calls().len(), 1);

        let second_plan = &seen.lock().unwrap()[1];
        assert_eq!(
            second_plan.last(),
            Some(&Turn::ToolResult {
                call_id: "call_1".to_string(),
                content: "/outputs/trimmed_video.mp4".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_tool_failure_is_fed_back_and_loop_continues() {
        let engine = Arc::new(ScriptedEngine::new());
        let steps = vec![
            PlanStep::Invoke(vec![
                select("call_1", "trim_video", json!({"input_path": "a.mp4"})),
                select("call_2", "does_not_exist", json!({})),
            ]),
            PlanStep::Respond("I need start and end times.".to_string()),
            PlanStep::Respond("Still here.".to_string()),
        ];
        let (mut driver, seen, _) = driver(steps, Arc::clone(&engine), DriverOptions::default()).await;

        let reply = driver.handle_input("trim a.mp4").await;
        assert_eq!(reply, DriverReply::Response("I need start and end times.".to_string()));
        assert!(engine.calls().is_empty());

        let history = seen.lock().unwrap()[1].clone();
        match &history[2] {
            Turn::ToolResult { content, .. } => {
                assert!(content.starts_with("Error: Invalid arguments for 'trim_video'"))
            }
            other => panic!("unexpected turn {:?}", other),
        }
        assert_eq!(
            history[3],
            Turn::ToolResult {
                call_id: "call_2".to_string(),
                content: "Error: unknown tool: does_not_exist".to_string(),
            }
        );

        assert_eq!(
            driver.handle_input("hello?").await,
            DriverReply::Response("Still here.".to_string())
        );
    }

    #[tokio::test]
    async fn test_channel_closing_mid_call_fails_intent_and_rolls_back() {
        let engine = Arc::new(ScriptedEngine::new().with_delay("trim_video", Duration::from_secs(5)));
        let steps = vec![
            PlanStep::Respond("first".to_string()),
            PlanStep::Invoke(vec![trim_selection("call_1")]),
            PlanStep::Respond("never reached".to_string()),
        ];
        let (mut driver, seen, _) = driver(steps, engine, DriverOptions::default()).await;
        driver.handle_input("hello").await;
        let history_before = driver.history().to_vec();

        let channel = Arc::clone(driver.session().unwrap().channel());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            channel.close().await;
        });

        let reply = tokio::time::timeout(Duration::from_secs(2), driver.handle_input("trim a.mp4"))
            .await
            .expect("intent hung after channel closed");

        assert_eq!(reply, DriverReply::Failure("channel closed".to_string()));
        assert_eq!(driver.history(), history_before.as_slice());
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(driver.state(), DriverState::Idle);
    }

    #[tokio::test]
    async fn test_reconnects_after_close_and_rolls_back_failed_intent() {
        let engine = Arc::new(ScriptedEngine::new());
        let steps = vec![
            PlanStep::Respond("first".to_string()),
            PlanStep::Invoke(vec![trim_selection("call_1")]),
        ];
        let (mut driver, _, connects) = driver(steps, Arc::clone(&engine), DriverOptions::default()).await;
        assert_eq!(
            driver.handle_input("hello").await,
            DriverReply::Response("first".to_string())
        );
        let history_before = driver.history().to_vec();

        driver.session().unwrap().close().await;
        let reply = driver.handle_input("trim a.mp4").await;

        assert_eq!(connects.load(Ordering::SeqCst), 2);
        // Script runs out after the tool call, so planning fails.
        assert!(matches!(reply, DriverReply::Failure(_)));
        assert_eq!(driver.history(), history_before.as_slice());
        assert_eq!(engine.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_budget_is_bounded() {
        let engine = Arc::new(ScriptedEngine::new());
        let options = DriverOptions {
            max_reconnects: 0,
            ..DriverOptions::default()
        };
        let (mut driver, seen, connects) =
            driver(vec![PlanStep::Respond("never".to_string())], engine, options).await;

        driver.session().unwrap().close().await;
        let reply = driver.handle_input("trim a.mp4").await;

        match reply {
            DriverReply::Failure(text) => assert!(text.contains("reconnect limit")),
            other => panic!("unexpected reply {:?}", other),
        }
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert!(seen.lock().unwrap().is_empty());
        assert!(driver.history().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_execution_keeps_result_order() {
        let engine = Arc::new(
            ScriptedEngine::new()
                .with_delay("trim_video", Duration::from_millis(200))
                .with_delay("extract_audio", Duration::from_millis(5)),
        );
        let steps = vec![
            PlanStep::Invoke(vec![
                trim_selection("call_trim"),
                select("call_audio", "extract_audio", json!({"input_path": "b.mp4"})),
            ]),
            PlanStep::Respond("done".to_string()),
        ];
        let options = DriverOptions {
            execution: Execution::Concurrent,
            ..DriverOptions::default()
        };
        let (mut driver, seen, _) = driver(steps, engine, options).await;

        assert_eq!(driver.handle_input("both").await, DriverReply::Response("done".to_string()));

        let history = seen.lock().unwrap()[1].clone();
        assert_eq!(
            &history[2..],
            &[
                Turn::ToolResult {
                    call_id: "call_trim".to_string(),
                    content: "/outputs/trimmed_video.mp4".to_string(),
                },
                Turn::ToolResult {
                    call_id: "call_audio".to_string(),
                    content: "/outputs/extracted_audio.mp3".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_iteration_cap_is_reported_as_text() {
        let engine = Arc::new(ScriptedEngine::new());
        let steps = vec![
            PlanStep::Invoke(vec![trim_selection("call_1")]),
            PlanStep::Invoke(vec![trim_selection("call_2")]),
        ];
        let options = DriverOptions {
            max_iterations: 2,
            ..DriverOptions::default()
        };
        let (mut driver, _, _) = driver(steps, Arc::clone(&engine), options).await;

        match driver.handle_input("loop forever").await {
            DriverReply::Response(text) => assert!(text.contains("Stopped after 2 planning steps")),
            other => panic!("unexpected reply {:?}", other),
        }
        assert_eq!(engine.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_clear_and_history_trim() {
        let engine = Arc::new(ScriptedEngine::new());
        let steps = vec![
            PlanStep::Respond("one".to_string()),
            PlanStep::Invoke(vec![trim_selection("call_1")]),
            PlanStep::Respond("two".to_string()),
        ];
        let options = DriverOptions {
            history_limit: 3,
            ..DriverOptions::default()
        };
        let (mut driver, _, _) = driver(steps, engine, options).await;

        driver.handle_input("first").await;
        assert_eq!(driver.history().len(), 2);

        driver.handle_input("second").await;
        assert_eq!(driver.history().len(), 4);
        assert_eq!(driver.history()[0], Turn::User("second".to_string()));
        assert_eq!(driver.history()[3], Turn::Assistant("two".to_string()));

        assert_eq!(driver.handle_input("clear").await, DriverReply::Cleared);
        assert!(driver.history().is_empty());
        assert_eq!(driver.handle_input("   ").await, DriverReply::Empty);
    }
}
