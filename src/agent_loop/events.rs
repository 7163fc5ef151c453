//! Turn event stream types.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Message, ToolInput, ToolResult};

use super::state::LoopState;

/// Unique turn identifier.
pub type TurnId = Uuid;

/// Concrete event payloads emitted by the orchestration loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEventPayload {
    TurnStarted {
        user_text: String,
    },
    StateChanged {
        from: LoopState,
        to: LoopState,
    },
    /// One streamed text fragment, in provider emission order.
    TextReceived {
        text: String,
    },
    ToolExecuting {
        call_id: String,
        tool_name: String,
        input: ToolInput,
    },
    ToolCompleted {
        call_id: String,
        tool_name: String,
        duration_ms: u64,
        result: ToolResult,
    },
    TurnFinalized {
        message: Message,
    },
    TurnCancelled,
    TurnFailed {
        error: String,
    },
}

/// Envelope for turn events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentEvent {
    pub turn_id: TurnId,
    /// Per-turn sequence number, starting at 1.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: AgentEventPayload,
}

/// Callback used for streaming turn events. Invoked on an unspecified task.
pub type AgentEventSink = Arc<dyn Fn(AgentEvent) + Send + Sync>;

pub(crate) struct AgentEventEmitter {
    turn_id: TurnId,
    seq: AtomicU64,
    sink: Option<AgentEventSink>,
}

impl AgentEventEmitter {
    pub(crate) fn new(turn_id: TurnId, sink: Option<AgentEventSink>) -> Self {
        Self {
            turn_id,
            seq: AtomicU64::new(1),
            sink,
        }
    }

    pub(crate) fn emit(&self, payload: AgentEventPayload) {
        let Some(sink) = &self.sink else { return };
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        (sink)(AgentEvent {
            turn_id: self.turn_id,
            seq,
            timestamp: Utc::now(),
            payload,
        });
    }
}
