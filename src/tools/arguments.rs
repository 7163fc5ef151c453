//! Typed access to untyped tool input.

use crate::error::PilotError;
use crate::types::ToolInput;

/// Wrapper around a tool's input map providing typed extraction.
///
/// Every accessor fails with a descriptive [`PilotError::InvalidArgument`]
/// naming the key and the expected type, which converts into a failed
/// [`ToolResult`](crate::types::ToolResult) the model can act on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments {
    values: ToolInput,
}

impl ToolArguments {
    pub fn new(values: ToolInput) -> Self {
        Self { values }
    }

    pub fn raw(&self) -> &ToolInput {
        &self.values
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn require(&self, key: &str) -> Result<&serde_json::Value, PilotError> {
        self.values
            .get(key)
            .filter(|v| !v.is_null())
            .ok_or_else(|| PilotError::InvalidArgument(format!("missing required parameter '{key}'")))
    }

    fn mismatch(key: &str, expected: &str, found: &serde_json::Value) -> PilotError {
        PilotError::InvalidArgument(format!(
            "parameter '{key}' must be {expected}, got {}",
            type_name(found)
        ))
    }

    pub fn get_str(&self, key: &str) -> Result<&str, PilotError> {
        let value = self.require(key)?;
        value
            .as_str()
            .ok_or_else(|| Self::mismatch(key, "a string", value))
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_str())
    }

    /// Integer argument; numeric strings such as `"42"` are accepted.
    pub fn get_i64(&self, key: &str) -> Result<i64, PilotError> {
        let value = self.require(key)?;
        value
            .as_i64()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
            .ok_or_else(|| Self::mismatch(key, "an integer", value))
    }

    pub fn get_i64_opt(&self, key: &str) -> Option<i64> {
        self.get_i64(key).ok()
    }

    pub fn get_f64(&self, key: &str) -> Result<f64, PilotError> {
        let value = self.require(key)?;
        value
            .as_f64()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
            .ok_or_else(|| Self::mismatch(key, "a number", value))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, PilotError> {
        let value = self.require(key)?;
        value
            .as_bool()
            .ok_or_else(|| Self::mismatch(key, "a boolean", value))
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.values.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    pub fn get_array(&self, key: &str) -> Result<&Vec<serde_json::Value>, PilotError> {
        let value = self.require(key)?;
        value
            .as_array()
            .ok_or_else(|| Self::mismatch(key, "an array", value))
    }

    /// String argument restricted to `allowed` (case-insensitive).
    pub fn get_enum<'a>(&self, key: &str, allowed: &[&'a str]) -> Result<&'a str, PilotError> {
        let raw = self.get_str(key)?;
        allowed
            .iter()
            .find(|candidate| candidate.eq_ignore_ascii_case(raw))
            .copied()
            .ok_or_else(|| {
                PilotError::InvalidArgument(format!(
                    "parameter '{key}' must be one of [{}], got '{raw}'",
                    allowed.join(", ")
                ))
            })
    }

    /// Deserialize the whole input into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, PilotError> {
        serde_json::from_value(serde_json::Value::Object(self.values.clone()))
            .map_err(|e| PilotError::InvalidArgument(format!("invalid parameters: {e}")))
    }
}

impl From<ToolInput> for ToolArguments {
    fn from(values: ToolInput) -> Self {
        Self::new(values)
    }
}

fn type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
