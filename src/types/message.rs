//! Conversation message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::PilotError;

use super::tool_result::{ToolInput, ToolResult, ToolUse};

/// A message in a conversation session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    /// Text content; `None` while an assistant reply is still streaming.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Tool calls requested by the assistant. Fixed at construction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ToolCall>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_role(Role::User, Some(text.into()))
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::with_role(Role::System, Some(text.into()))
    }

    /// Create a final assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, Some(text.into()))
    }

    /// Create an assistant message carrying finalized tool calls.
    ///
    /// Empty partial text is stored as `None`.
    pub fn assistant_with_tools(text: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.filter(|t| !t.is_empty()),
            tool_calls,
            timestamp: Utc::now(),
        }
    }

    fn with_role(role: Role, content: Option<String>) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Text content, or an empty string.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// Tool calls attached to this message.
    pub fn tool_calls(&self) -> &[ToolCall] {
        &self.tool_calls
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Execution status of a tool call. Moves strictly forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolCallStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

impl ToolCallStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A model-requested invocation of a named tool and its outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Provider-assigned id used to correlate the result.
    pub id: String,
    pub name: String,
    pub input: ToolInput,
    status: ToolCallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<ToolResult>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: ToolInput) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
            status: ToolCallStatus::Pending,
            result: None,
        }
    }

    pub fn status(&self) -> ToolCallStatus {
        self.status
    }

    pub fn result(&self) -> Option<&ToolResult> {
        self.result.as_ref()
    }

    /// `Pending -> Executing`.
    pub fn start(&mut self) -> Result<(), PilotError> {
        if self.status != ToolCallStatus::Pending {
            return Err(PilotError::InvalidState(format!(
                "tool call '{}' cannot start from {}",
                self.id, self.status
            )));
        }
        self.status = ToolCallStatus::Executing;
        Ok(())
    }

    /// `Executing -> Completed | Failed`, recording the result exactly once.
    pub fn finish(&mut self, result: ToolResult) -> Result<(), PilotError> {
        if self.status != ToolCallStatus::Executing {
            return Err(PilotError::InvalidState(format!(
                "tool call '{}' cannot finish from {}",
                self.id, self.status
            )));
        }
        self.status = if result.success {
            ToolCallStatus::Completed
        } else {
            ToolCallStatus::Failed
        };
        self.result = Some(result);
        Ok(())
    }

    /// The provider-side view of this call.
    pub fn to_tool_use(&self) -> ToolUse {
        ToolUse {
            id: self.id.clone(),
            name: self.name.clone(),
            input: self.input.clone(),
        }
    }
}

impl From<&ToolUse> for ToolCall {
    fn from(tool_use: &ToolUse) -> Self {
        Self::new(tool_use.id.clone(), tool_use.name.clone(), tool_use.input.clone())
    }
}
