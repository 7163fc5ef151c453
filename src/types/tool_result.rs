//! Tool invocation and result types shared by the loop, bridge and providers.

use serde::{Deserialize, Serialize};

/// Untyped tool input: string keys to dynamically-typed values.
pub type ToolInput = serde_json::Map<String, serde_json::Value>;

/// Outcome of one tool execution. Produced exactly once per tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub success: bool,
    /// Human-readable summary (or the failure reason).
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub data: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl ToolResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: serde_json::Map::new(),
            warning: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: serde_json::Map::new(),
            warning: None,
        }
    }

    /// Attach one structured data entry.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }

    /// Serialized form fed back to the model.
    pub fn to_feedback_json(&self, tool_name: &str) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("tool".into(), tool_name.into());
        obj.insert("success".into(), self.success.into());
        obj.insert("message".into(), self.message.clone().into());
        if !self.data.is_empty() {
            obj.insert("data".into(), serde_json::Value::Object(self.data.clone()));
        }
        if let Some(ref warning) = self.warning {
            obj.insert("warning".into(), warning.clone().into());
        }
        serde_json::Value::Object(obj)
    }
}

/// A tool invocation requested by the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolUse {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: ToolInput,
}

/// An executed tool call ready to be formatted back for the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallResult {
    pub call_id: String,
    pub tool_name: String,
    pub input: ToolInput,
    pub result: ToolResult,
}

impl ToolCallResult {
    pub fn feedback_json(&self) -> serde_json::Value {
        self.result.to_feedback_json(&self.tool_name)
    }
}

/// Coerce a provider-supplied input value into a [`ToolInput`] map.
///
/// Non-object values (including unparseable argument strings) are kept
/// under a single `"input"` key so the tool can report them.
pub fn input_from_value(value: serde_json::Value) -> ToolInput {
    match value {
        serde_json::Value::Object(map) => map,
        serde_json::Value::Null => ToolInput::new(),
        serde_json::Value::String(raw) if raw.trim().is_empty() => ToolInput::new(),
        serde_json::Value::String(raw) => match serde_json::from_str(&raw) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => {
                let mut map = ToolInput::new();
                map.insert("input".into(), serde_json::Value::String(raw));
                map
            }
        },
        other => {
            let mut map = ToolInput::new();
            map.insert("input".into(), other);
            map
        }
    }
}
