//! The orchestration loop.

use std::sync::{Arc, RwLock};
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bridge::ToolExecutor;
use crate::error::PilotError;
use crate::provider::{ProviderClient, ProviderRequest};
use crate::session::Session;
use crate::types::{Message, ToolCall};

use super::events::{AgentEventEmitter, AgentEventPayload, AgentEventSink, TurnId};
use super::state::{LoopState, StateTracker};
use super::types::{LoopSettings, TurnOutcome};

/// Drives turns: provider round, tool dispatch through the executor, repeat.
///
/// One turn runs at a time per loop; a second `process_turn` waits for the
/// first to finish. Messages reach the session only when a turn ends: the
/// whole turn on `Finalized`, the User message plus a System note on
/// `Failed`, nothing on `Cancelled`.
pub struct AgentLoop {
    provider: Arc<dyn ProviderClient>,
    executor: Arc<dyn ToolExecutor>,
    session: Arc<RwLock<Session>>,
    settings: LoopSettings,
    event_sink: Option<AgentEventSink>,
    turn_lock: tokio::sync::Mutex<()>,
}

/// How the round loop ended, before anything is committed.
enum TurnEnd {
    Finalized(Message),
    Cancelled,
    Failed(String),
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn ProviderClient>, executor: Arc<dyn ToolExecutor>) -> Self {
        Self {
            provider,
            executor,
            session: Arc::new(RwLock::new(Session::new())),
            settings: LoopSettings::default(),
            event_sink: None,
            turn_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_settings(mut self, settings: LoopSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_event_sink(mut self, sink: AgentEventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Share an existing session (e.g. with a UI projection).
    pub fn with_session(mut self, session: Arc<RwLock<Session>>) -> Self {
        self.session = session;
        self
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn session(&self) -> Arc<RwLock<Session>> {
        self.session.clone()
    }

    /// Snapshot of the committed history.
    pub fn messages(&self) -> Vec<Message> {
        self.read_session().snapshot()
    }

    /// Start a new session once any running turn has unwound.
    pub async fn reset_session(&self) {
        let _turn = self.turn_lock.lock().await;
        self.write_session().reset();
        info!("session reset");
    }

    fn read_session(&self) -> std::sync::RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_session(&self) -> std::sync::RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Run one user turn to completion, cancellation or failure.
    pub async fn process_turn(
        &self,
        user_text: impl Into<String>,
        cancel: CancellationToken,
    ) -> TurnOutcome {
        let user_text = user_text.into();
        let _turn = self.turn_lock.lock().await;

        let turn_id: TurnId = Uuid::new_v4();
        let emitter = AgentEventEmitter::new(turn_id, self.event_sink.clone());
        let tracker = StateTracker::new(&emitter);
        emitter.emit(AgentEventPayload::TurnStarted {
            user_text: user_text.clone(),
        });
        info!(%turn_id, provider = self.provider.provider_name(), "turn started");

        let mut draft = vec![Message::user(user_text)];
        let end = match self.run_rounds(turn_id, &mut draft, &tracker, &emitter, &cancel).await {
            Ok(end) => end,
            Err(err) => TurnEnd::Failed(err.to_string()),
        };

        match end {
            TurnEnd::Finalized(message) => {
                let _ = tracker.transition(LoopState::Finalized);
                draft.push(message.clone());
                self.write_session().extend(draft);
                emitter.emit(AgentEventPayload::TurnFinalized {
                    message: message.clone(),
                });
                info!(%turn_id, "turn finalized");
                TurnOutcome::Finalized(message)
            }
            TurnEnd::Cancelled => {
                let interrupted = tracker.current();
                let _ = tracker.transition(LoopState::Cancelled);
                emitter.emit(AgentEventPayload::TurnCancelled);
                info!(%turn_id, state = %interrupted, discarded = draft.len(), "turn cancelled");
                TurnOutcome::Cancelled
            }
            TurnEnd::Failed(reason) => {
                let interrupted = tracker.current();
                let _ = tracker.transition(LoopState::Failed);
                let system = Message::system(format!("Error: {reason}"));
                let user = draft.swap_remove(0);
                self.write_session().extend([user, system.clone()]);
                emitter.emit(AgentEventPayload::TurnFailed {
                    error: reason.clone(),
                });
                warn!(%turn_id, state = %interrupted, error = %reason, "turn failed");
                TurnOutcome::Failed(system)
            }
        }
    }

    async fn run_rounds(
        &self,
        turn_id: TurnId,
        draft: &mut Vec<Message>,
        tracker: &StateTracker<'_>,
        emitter: &AgentEventEmitter,
        cancel: &CancellationToken,
    ) -> Result<TurnEnd, PilotError> {
        let history = self.messages();
        let tools = self.executor.declarations();
        let max_rounds = self.settings.max_tool_rounds;
        let mut tool_rounds = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Ok(TurnEnd::Cancelled);
            }
            tracker.transition(LoopState::Sending)?;

            let request = ProviderRequest {
                messages: history.iter().chain(draft.iter()).cloned().collect(),
                system_prompt: self.settings.system_prompt.clone(),
                tools: tools.clone(),
                settings: self.settings.generation.clone(),
            };
            let on_delta = |text: &str| {
                tracker.advance_if(LoopState::Sending, LoopState::StreamingText);
                emitter.emit(AgentEventPayload::TextReceived {
                    text: text.to_string(),
                });
            };

            debug!(%turn_id, round = tool_rounds, messages = request.messages.len(), "provider round");
            let response = self.provider.send(&request, &on_delta, cancel).await;

            if cancel.is_cancelled() || response.is_cancelled() {
                return Ok(TurnEnd::Cancelled);
            }
            if !response.success {
                let reason = response
                    .error
                    .unwrap_or_else(|| "provider request failed".to_string());
                return Ok(TurnEnd::Failed(reason));
            }
            if !response.wants_tools() {
                return Ok(TurnEnd::Finalized(Message::assistant(response.text)));
            }

            tool_rounds += 1;
            if tool_rounds > max_rounds {
                return Ok(TurnEnd::Failed(format!(
                    "tool loop exceeded max rounds ({max_rounds})"
                )));
            }

            tracker.transition(LoopState::ToolsRequested)?;
            tracker.transition(LoopState::ExecutingTools)?;

            let mut calls: Vec<ToolCall> = response.tool_uses.iter().map(ToolCall::from).collect();
            for call in &mut calls {
                if cancel.is_cancelled() {
                    return Ok(TurnEnd::Cancelled);
                }
                call.start()?;
                emitter.emit(AgentEventPayload::ToolExecuting {
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    input: call.input.clone(),
                });

                let started = Instant::now();
                let result = self
                    .executor
                    .execute(&call.name, call.input.clone(), cancel)
                    .await;
                if cancel.is_cancelled() {
                    return Ok(TurnEnd::Cancelled);
                }
                let duration_ms = started.elapsed().as_millis() as u64;

                debug!(
                    %turn_id,
                    tool = %call.name,
                    call_id = %call.id,
                    success = result.success,
                    elapsed_ms = duration_ms,
                    "tool completed"
                );
                emitter.emit(AgentEventPayload::ToolCompleted {
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    duration_ms,
                    result: result.clone(),
                });
                call.finish(result)?;
            }

            draft.push(Message::assistant_with_tools(Some(response.text), calls));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderResponse, TextDeltaCallback};
    use crate::tools::ToolDeclaration;
    use crate::types::{StopReason, ToolCallResult, ToolInput, ToolResult, ToolUse, Usage};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Provider that asks for the same tool forever.
    struct AlwaysTools;

    #[async_trait]
    impl ProviderClient for AlwaysTools {
        fn provider_name(&self) -> &str {
            "loop"
        }

        fn model_id(&self) -> &str {
            "loop-1"
        }

        async fn send(
            &self,
            request: &ProviderRequest,
            _on_text_delta: &TextDeltaCallback<'_>,
            _cancel: &CancellationToken,
        ) -> ProviderResponse {
            ProviderResponse::completed(
                String::new(),
                vec![ToolUse {
                    id: format!("call_{}", request.messages.len()),
                    name: "ping".into(),
                    input: ToolInput::new(),
                }],
                StopReason::ToolUse,
                Usage::default(),
            )
        }

        fn format_assistant_turn(&self, _text: Option<&str>, _tool_uses: &[ToolUse]) -> Value {
            json!({})
        }

        fn format_tool_results(&self, _results: &[ToolCallResult]) -> Vec<Value> {
            Vec::new()
        }
    }

    #[derive(Default)]
    struct CountingExecutor {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl ToolExecutor for CountingExecutor {
        fn declarations(&self) -> Vec<ToolDeclaration> {
            Vec::new()
        }

        async fn execute(
            &self,
            _tool_name: &str,
            _input: ToolInput,
            _cancel: &CancellationToken,
        ) -> ToolResult {
            *self.calls.lock().unwrap() += 1;
            ToolResult::success("pong")
        }
    }

    #[tokio::test]
    async fn runaway_tool_loop_fails_after_max_rounds() {
        let executor = Arc::new(CountingExecutor::default());
        let agent = AgentLoop::new(Arc::new(AlwaysTools), executor.clone())
            .with_settings(LoopSettings::builder().max_tool_rounds(3).build());

        let outcome = agent.process_turn("go", CancellationToken::new()).await;

        let TurnOutcome::Failed(message) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(message.text(), "Error: tool loop exceeded max rounds (3)");
        assert_eq!(*executor.calls.lock().unwrap(), 3);

        let history = agent.messages();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text(), "go");
        assert_eq!(history[1].role, crate::types::Role::System);
    }

    #[tokio::test]
    async fn pre_cancelled_turn_leaves_session_untouched() {
        let agent = AgentLoop::new(Arc::new(AlwaysTools), Arc::new(CountingExecutor::default()));
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(agent.process_turn("go", cancel).await.is_cancelled());
        assert!(agent.messages().is_empty());
    }
}
