//! Caller layer: turn pre-emption, cancellation and session control.

pub mod runtime;

pub use runtime::{AgentRuntime, AgentState};
