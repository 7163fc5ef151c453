//! Loop settings and turn outcomes.

use bon::Builder;

use crate::config::EngineSettings;
use crate::types::{GenerationSettings, Message};

use super::state::LoopState;

/// Default cap on consecutive tool rounds within one turn.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 25;

/// Per-loop settings forwarded to every provider round.
#[derive(Debug, Clone, Builder, PartialEq)]
pub struct LoopSettings {
    #[builder(into)]
    pub system_prompt: Option<String>,
    #[builder(default = DEFAULT_MAX_TOOL_ROUNDS)]
    pub max_tool_rounds: usize,
    #[builder(default)]
    pub generation: GenerationSettings,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl From<&EngineSettings> for LoopSettings {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            system_prompt: settings.system_prompt.clone(),
            max_tool_rounds: settings.max_tool_rounds,
            generation: settings.generation.clone(),
        }
    }
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The model answered; carries the final Assistant message.
    Finalized(Message),
    /// The turn was cancelled; nothing was appended to the session.
    Cancelled,
    /// The turn aborted; carries the System message describing why.
    Failed(Message),
}

impl TurnOutcome {
    pub fn message(&self) -> Option<&Message> {
        match self {
            Self::Finalized(msg) | Self::Failed(msg) => Some(msg),
            Self::Cancelled => None,
        }
    }

    pub fn state(&self) -> LoopState {
        match self {
            Self::Finalized(_) => LoopState::Finalized,
            Self::Cancelled => LoopState::Cancelled,
            Self::Failed(_) => LoopState::Failed,
        }
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self, Self::Finalized(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
