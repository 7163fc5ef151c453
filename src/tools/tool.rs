//! Capability contract implemented by every host tool.

use std::sync::Arc;

use super::arguments::ToolArguments;
use super::schema::{ToolDeclaration, ToolSchema};
use crate::error::PilotError;
use crate::types::ToolResult;

/// The host's mutable state, reachable only on its single execution context.
pub trait HostContext: Send + 'static {
    /// Whether the host can run tools right now (e.g. a document is open).
    fn is_available(&self) -> bool {
        true
    }

    /// Failure message reported when [`HostContext::is_available`] is false.
    fn unavailable_reason(&self) -> String {
        "no active document is open in the host".to_string()
    }
}

/// A capability the model can invoke against the host.
///
/// `execute` runs synchronously on the host's execution context and must
/// report expected failures (missing or malformed parameters, business
/// rules) as a failed [`ToolResult`] rather than panicking.
pub trait Tool<H>: Send + Sync {
    /// Tool name (must match what the model calls).
    fn name(&self) -> &str;

    /// Natural-language description shown to the model.
    fn description(&self) -> &str;

    fn schema(&self) -> &ToolSchema;

    fn execute(&self, host: &mut H, args: &ToolArguments) -> ToolResult;

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: self.name().to_string(),
            description: self.description().to_string(),
            schema: self.schema().clone(),
        }
    }
}

impl From<PilotError> for ToolResult {
    fn from(err: PilotError) -> Self {
        match err {
            PilotError::InvalidArgument(message) => ToolResult::failure(message),
            other => ToolResult::failure(other.to_string()),
        }
    }
}

type ToolHandler<H> = dyn Fn(&mut H, &ToolArguments) -> ToolResult + Send + Sync;

/// Closure-based tool for quick tool creation.
pub struct FnTool<H> {
    name: String,
    description: String,
    schema: ToolSchema,
    handler: Arc<ToolHandler<H>>,
}

impl<H> FnTool<H> {
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: ToolSchema,
        handler: F,
    ) -> Self
    where
        F: Fn(&mut H, &ToolArguments) -> ToolResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            handler: Arc::new(handler),
        }
    }
}

impl<H> Tool<H> for FnTool<H> {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    fn execute(&self, host: &mut H, args: &ToolArguments) -> ToolResult {
        (self.handler)(host, args)
    }
}

impl<H> std::fmt::Debug for FnTool<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}
