//! Caller-facing runtime wrapping the agent loop.
//!
//! - [`AgentRuntime::submit`]: start a turn, pre-empting any in-flight one
//! - [`AgentRuntime::prompt`]: submit and wait for the outcome
//! - [`AgentRuntime::cancel`]: cancel the current turn
//! - [`AgentRuntime::reset_session`]: cancel, then start a fresh session
//! - [`AgentRuntime::wait_for_idle`]: block until no turn is running

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::agent_loop::{AgentEventSink, AgentLoop, LoopSettings, TurnOutcome};
use crate::bridge::ToolExecutor;
use crate::config::{EngineSettings, PilotConfig};
use crate::error::PilotError;
use crate::provider::create_provider;
use crate::types::Message;

/// Runtime state as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    /// No turn in progress.
    Idle,
    /// At least one turn task is alive (possibly unwinding after a cancel).
    Running,
}

/// Owns the cancellation token of the most recent turn.
///
/// Submitting new input while a turn is in flight cancels that turn first;
/// the loop's turn lock guarantees the new turn starts only after the old
/// one has unwound. Must be used from within a Tokio runtime.
pub struct AgentRuntime {
    agent: Arc<AgentLoop>,
    active: Arc<Mutex<Option<ActiveTurn>>>,
    next_turn: AtomicU64,
    in_flight: Arc<AtomicUsize>,
    state_tx: Arc<watch::Sender<AgentState>>,
    state_rx: watch::Receiver<AgentState>,
}

impl AgentRuntime {
    pub fn new(agent: AgentLoop) -> Self {
        let (state_tx, state_rx) = watch::channel(AgentState::Idle);
        Self {
            agent: Arc::new(agent),
            active: Arc::new(Mutex::new(None)),
            next_turn: AtomicU64::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            state_tx: Arc::new(state_tx),
            state_rx,
        }
    }

    /// Build a runtime from engine settings: resolves the model, creates the
    /// provider client and applies loop limits.
    pub fn from_settings(
        settings: &EngineSettings,
        config: &PilotConfig,
        executor: Arc<dyn ToolExecutor>,
        event_sink: Option<AgentEventSink>,
    ) -> Result<Self, PilotError> {
        settings.validate()?;
        let spec = settings.model_spec()?;
        let provider = create_provider(&spec, config)?;
        info!(model = %spec, "agent runtime configured");

        let mut agent = AgentLoop::new(provider, executor).with_settings(LoopSettings::from(settings));
        if let Some(sink) = event_sink {
            agent = agent.with_event_sink(sink);
        }
        Ok(Self::new(agent))
    }

    pub fn agent(&self) -> &AgentLoop {
        &self.agent
    }

    pub fn state(&self) -> AgentState {
        *self.state_rx.borrow()
    }

    /// Subscribe to Idle/Running changes.
    pub fn watch_state(&self) -> watch::Receiver<AgentState> {
        self.state_rx.clone()
    }

    /// Snapshot of the committed session history.
    pub fn messages(&self) -> Vec<Message> {
        self.agent.messages()
    }

    /// Start a turn for `text`, cancelling the in-flight turn if there is one.
    pub async fn submit(&self, text: impl Into<String>) -> JoinHandle<TurnOutcome> {
        let text = text.into();
        let cancel = CancellationToken::new();
        let id = self.next_turn.fetch_add(1, Ordering::SeqCst);
        {
            let mut active = self.active.lock().await;
            let turn = ActiveTurn {
                id,
                cancel: cancel.clone(),
            };
            if let Some(previous) = active.replace(turn) {
                if !previous.cancel.is_cancelled() {
                    debug!("pre-empting in-flight turn");
                    previous.cancel.cancel();
                }
            }
        }

        let agent = self.agent.clone();
        let active = self.active.clone();
        let guard = InFlight::enter(self.in_flight.clone(), self.state_tx.clone());
        tokio::spawn(async move {
            let _guard = guard;
            let outcome = agent.process_turn(text, cancel).await;
            let mut active = active.lock().await;
            if active.as_ref().is_some_and(|turn| turn.id == id) {
                active.take();
            }
            outcome
        })
    }

    /// Submit and wait for the outcome.
    pub async fn prompt(&self, text: impl Into<String>) -> Result<TurnOutcome, PilotError> {
        self.submit(text)
            .await
            .await
            .map_err(|e| PilotError::InvalidState(format!("turn task failed: {e}")))
    }

    /// Cancel the current turn. Returns `false` if there was nothing to cancel.
    pub async fn cancel(&self) -> bool {
        match self.active.lock().await.take() {
            Some(turn) if !turn.cancel.is_cancelled() => {
                turn.cancel.cancel();
                info!("turn cancellation requested");
                true
            }
            _ => false,
        }
    }

    /// Cancel any in-flight turn, wait for it to unwind, then start a new
    /// empty session.
    pub async fn reset_session(&self) {
        self.cancel().await;
        self.agent.reset_session().await;
    }

    /// Wait until no turn task is running.
    pub async fn wait_for_idle(&self) {
        let mut rx = self.state_rx.clone();
        let _ = rx.wait_for(|state| *state == AgentState::Idle).await;
    }
}

/// The most recently submitted turn, until its task finishes.
struct ActiveTurn {
    id: u64,
    cancel: CancellationToken,
}

/// Counts live turn tasks; flips the published state on the 0 <-> 1 edges.
struct InFlight {
    count: Arc<AtomicUsize>,
    state_tx: Arc<watch::Sender<AgentState>>,
}

impl InFlight {
    fn enter(count: Arc<AtomicUsize>, state_tx: Arc<watch::Sender<AgentState>>) -> Self {
        if count.fetch_add(1, Ordering::SeqCst) == 0 {
            state_tx.send_replace(AgentState::Running);
        }
        Self { count, state_tx }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state_tx.send_replace(AgentState::Idle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderClient, ProviderRequest, ProviderResponse, TextDeltaCallback};
    use crate::tools::ToolDeclaration;
    use crate::types::{StopReason, ToolCallResult, ToolInput, ToolResult, ToolUse, Usage};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::time::Duration;

    /// Answers `"echo: <last user text>"`, waiting for cancellation when the
    /// text is `"hang"`.
    struct Echo;

    #[async_trait]
    impl ProviderClient for Echo {
        fn provider_name(&self) -> &str {
            "echo"
        }

        fn model_id(&self) -> &str {
            "echo-1"
        }

        async fn send(
            &self,
            request: &ProviderRequest,
            _on_text_delta: &TextDeltaCallback<'_>,
            cancel: &CancellationToken,
        ) -> ProviderResponse {
            let last = request.messages.last().map(|m| m.text().to_string()).unwrap_or_default();
            if last == "hang" {
                cancel.cancelled().await;
                return ProviderResponse::cancelled(String::new());
            }
            ProviderResponse::completed(format!("echo: {last}"), Vec::new(), StopReason::EndTurn, Usage::default())
        }

        fn format_assistant_turn(&self, _text: Option<&str>, _tool_uses: &[ToolUse]) -> Value {
            json!({})
        }

        fn format_tool_results(&self, _results: &[ToolCallResult]) -> Vec<Value> {
            Vec::new()
        }
    }

    struct NoTools;

    #[async_trait]
    impl ToolExecutor for NoTools {
        fn declarations(&self) -> Vec<ToolDeclaration> {
            Vec::new()
        }

        async fn execute(&self, tool_name: &str, _input: ToolInput, _cancel: &CancellationToken) -> ToolResult {
            ToolResult::failure(format!("Unknown tool: {tool_name}"))
        }
    }

    fn runtime() -> AgentRuntime {
        AgentRuntime::new(AgentLoop::new(Arc::new(Echo), Arc::new(NoTools)))
    }

    #[tokio::test]
    async fn new_input_preempts_in_flight_turn() {
        let runtime = runtime();
        let first = runtime.submit("hang").await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(runtime.state(), AgentState::Running);

        let second = runtime.submit("hello").await;
        assert!(first.await.unwrap().is_cancelled());
        let outcome = second.await.unwrap();
        assert_eq!(outcome.message().unwrap().text(), "echo: hello");

        runtime.wait_for_idle().await;
        assert_eq!(runtime.state(), AgentState::Idle);
        let texts: Vec<_> = runtime.messages().iter().map(|m| m.text().to_string()).collect();
        assert_eq!(texts, vec!["hello", "echo: hello"]);
    }

    #[tokio::test]
    async fn cancel_without_turn_is_noop() {
        let runtime = runtime();
        assert!(!runtime.cancel().await);
    }

    #[tokio::test]
    async fn cancel_targets_only_a_running_turn() {
        let runtime = runtime();
        runtime.prompt("done").await.unwrap();
        assert!(!runtime.cancel().await);

        let pending = runtime.submit("hang").await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(runtime.cancel().await);
        assert!(pending.await.unwrap().is_cancelled());
        assert!(!runtime.cancel().await);
    }

    #[tokio::test]
    async fn reset_session_clears_history() {
        let runtime = runtime();
        runtime.prompt("one").await.unwrap();
        assert_eq!(runtime.messages().len(), 2);
        runtime.reset_session().await;
        assert!(runtime.messages().is_empty());
    }
}
