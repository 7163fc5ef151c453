//! Orchestration loop: turn state machine, events and the round driver.

pub mod events;
pub mod runner;
pub mod state;
pub mod types;

pub use events::{AgentEvent, AgentEventPayload, AgentEventSink, TurnId};
pub use runner::AgentLoop;
pub use state::LoopState;
pub use types::{LoopSettings, TurnOutcome, DEFAULT_MAX_TOOL_ROUNDS};
