//! Turn state machine.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::error;

use crate::error::PilotError;

use super::events::{AgentEventEmitter, AgentEventPayload};

/// Where a turn currently is.
///
/// `Idle → Sending → StreamingText → (ToolsRequested → ExecutingTools →
/// Sending)* → Finalized`, with `Cancelled` and `Failed` reachable from any
/// non-terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LoopState {
    Idle,
    Sending,
    StreamingText,
    ToolsRequested,
    ExecutingTools,
    Finalized,
    Cancelled,
    Failed,
}

impl LoopState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::Cancelled | Self::Failed)
    }

    pub fn can_transition_to(self, next: LoopState) -> bool {
        use LoopState::*;
        if self.is_terminal() {
            return false;
        }
        if matches!(next, Cancelled | Failed) {
            return true;
        }
        matches!(
            (self, next),
            (Idle, Sending)
                | (Sending, StreamingText)
                | (Sending, ToolsRequested)
                | (Sending, Finalized)
                | (StreamingText, ToolsRequested)
                | (StreamingText, Finalized)
                | (ToolsRequested, ExecutingTools)
                | (ExecutingTools, Sending)
        )
    }
}

/// Validates transitions and reports each one as a `StateChanged` event.
pub(crate) struct StateTracker<'a> {
    current: Mutex<LoopState>,
    emitter: &'a AgentEventEmitter,
}

impl<'a> StateTracker<'a> {
    pub(crate) fn new(emitter: &'a AgentEventEmitter) -> Self {
        Self {
            current: Mutex::new(LoopState::Idle),
            emitter,
        }
    }

    pub(crate) fn current(&self) -> LoopState {
        *self.current.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub(crate) fn transition(&self, to: LoopState) -> Result<(), PilotError> {
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        let from = *current;
        if !from.can_transition_to(to) {
            error!(%from, %to, "invalid loop state transition");
            return Err(PilotError::InvalidState(format!(
                "invalid loop transition {from} -> {to}"
            )));
        }
        *current = to;
        drop(current);
        self.emitter
            .emit(AgentEventPayload::StateChanged { from, to });
        Ok(())
    }

    /// Move `from -> to` only if the machine is currently in `from`.
    pub(crate) fn advance_if(&self, from: LoopState, to: LoopState) -> bool {
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        if *current != from {
            return false;
        }
        *current = to;
        drop(current);
        self.emitter
            .emit(AgentEventPayload::StateChanged { from, to });
        true
    }
}
