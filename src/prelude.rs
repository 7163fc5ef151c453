//! Convenience re-exports for common use.

pub use crate::agent::AgentRuntime;
pub use crate::agent_loop::{AgentEvent, AgentEventPayload, AgentLoop, LoopSettings, LoopState, TurnOutcome};
pub use crate::bridge::{HostBridge, ToolExecutor};
pub use crate::config::{EngineSettings, PilotConfig};
pub use crate::error::{PilotError, Result};
pub use crate::models::ModelSpec;
pub use crate::provider::ProviderClient;
pub use crate::session::Session;
pub use crate::tools::{FnTool, HostContext, Tool, ToolArguments, ToolRegistry, ToolSchema};
pub use crate::types::{GenerationSettings, Message, Role, ToolCall, ToolResult};
