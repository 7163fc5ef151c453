//! Model provider trait and implementations.

pub mod http;

#[cfg(feature = "anthropic")]
pub mod anthropic;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "google")]
pub mod google;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::PilotConfig;
use crate::error::PilotError;
use crate::models::{ModelSpec, ProviderKind};
use crate::tools::ToolDeclaration;
use crate::types::{
    GenerationSettings, Message, Role, StopReason, ToolCall, ToolCallResult, ToolResult, ToolUse,
    Usage,
};

/// Callback receiving streamed text fragments, in arrival order.
pub type TextDeltaCallback<'a> = dyn Fn(&str) + Send + Sync + 'a;

/// One round's request: the full session history plus the tool catalogue.
#[derive(Debug, Clone, Default)]
pub struct ProviderRequest {
    pub messages: Vec<Message>,
    pub system_prompt: Option<String>,
    pub tools: Vec<ToolDeclaration>,
    pub settings: GenerationSettings,
}

/// Outcome of one provider round. Failures are reported here, never raised.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub success: bool,
    /// Full text of the round (the concatenation of every streamed delta).
    pub text: String,
    pub tool_uses: Vec<ToolUse>,
    pub stop_reason: StopReason,
    pub error: Option<String>,
    pub usage: Usage,
}

impl ProviderResponse {
    /// A completed round. The stop reason is `ToolUse` whenever tools were
    /// requested, whatever the wire reported.
    pub fn completed(
        text: String,
        tool_uses: Vec<ToolUse>,
        stop_reason: StopReason,
        usage: Usage,
    ) -> Self {
        let stop_reason = if tool_uses.is_empty() {
            stop_reason
        } else {
            StopReason::ToolUse
        };
        Self {
            success: true,
            text,
            tool_uses,
            stop_reason,
            error: None,
            usage,
        }
    }

    pub fn failure(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            text: String::new(),
            tool_uses: Vec::new(),
            stop_reason: StopReason::Error,
            error: Some(error.to_string()),
            usage: Usage::default(),
        }
    }

    /// The round was interrupted; `partial` is whatever text had streamed.
    pub fn cancelled(partial: String) -> Self {
        Self {
            success: false,
            text: partial,
            tool_uses: Vec::new(),
            stop_reason: StopReason::Cancelled,
            error: Some("request cancelled".to_string()),
            usage: Usage::default(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.stop_reason == StopReason::Cancelled
    }

    /// Whether the loop must execute tools and go another round.
    pub fn wants_tools(&self) -> bool {
        self.success && !self.tool_uses.is_empty()
    }
}

/// A tool result recovered from provider wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub success: bool,
}

/// Conversational model client.
///
/// Each adapter owns its wire format: how history, tool declarations and
/// tool results are serialized, and how the streamed response is parsed.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn provider_name(&self) -> &str;

    fn model_id(&self) -> &str;

    /// Run one round. Text deltas are delivered through `on_text_delta` as
    /// they arrive; `cancel` aborts the in-flight request.
    async fn send(
        &self,
        request: &ProviderRequest,
        on_text_delta: &TextDeltaCallback<'_>,
        cancel: &CancellationToken,
    ) -> ProviderResponse;

    fn format_user_turn(&self, text: &str) -> Value {
        serde_json::json!({ "role": "user", "content": text })
    }

    /// Wire form of an assistant turn that may carry tool invocations.
    fn format_assistant_turn(&self, text: Option<&str>, tool_uses: &[ToolUse]) -> Value;

    /// Wire form of executed tool results, ready to append to history.
    fn format_tool_results(&self, results: &[ToolCallResult]) -> Vec<Value>;

    /// Serialize session history. System messages are UI-only and skipped;
    /// assistant tool calls are followed by their recorded results.
    fn format_history(&self, messages: &[Message]) -> Vec<Value> {
        let mut wire = Vec::with_capacity(messages.len());
        for msg in messages {
            match msg.role {
                Role::System => {}
                Role::User => wire.push(self.format_user_turn(msg.text())),
                Role::Assistant => {
                    let tool_uses: Vec<ToolUse> =
                        msg.tool_calls().iter().map(ToolCall::to_tool_use).collect();
                    if tool_uses.is_empty() && msg.text().is_empty() {
                        continue;
                    }
                    wire.push(self.format_assistant_turn(msg.content.as_deref(), &tool_uses));
                    if !tool_uses.is_empty() {
                        let results: Vec<ToolCallResult> =
                            msg.tool_calls().iter().map(recorded_result).collect();
                        wire.extend(self.format_tool_results(&results));
                    }
                }
            }
        }
        wire
    }
}

fn recorded_result(call: &ToolCall) -> ToolCallResult {
    ToolCallResult {
        call_id: call.id.clone(),
        tool_name: call.name.clone(),
        input: call.input.clone(),
        result: call
            .result()
            .cloned()
            .unwrap_or_else(|| ToolResult::failure("tool call did not complete")),
    }
}

/// Read `tool` and `success` back out of a feedback payload.
pub(crate) fn decode_feedback(content: &str) -> Option<(String, bool)> {
    let value: Value = serde_json::from_str(content).ok()?;
    let tool = value.get("tool")?.as_str()?.to_string();
    let success = value.get("success")?.as_bool()?;
    Some((tool, success))
}

/// Instantiate the adapter for `spec` using credentials from `config`.
pub fn create_provider(
    spec: &ModelSpec,
    config: &PilotConfig,
) -> Result<Arc<dyn ProviderClient>, PilotError> {
    let key_name = spec.provider.config_key();
    let api_key = config.get_api_key(key_name).ok_or_else(|| {
        PilotError::Authentication(format!(
            "Missing API key for {}; set {}",
            spec.provider,
            spec.provider.api_key_env()
        ))
    })?;
    let base_url = config.get_base_url(key_name);

    match spec.provider {
        #[cfg(feature = "anthropic")]
        ProviderKind::Anthropic => Ok(Arc::new(anthropic::AnthropicProvider::new(
            spec.model_id.clone(),
            api_key,
            base_url,
        ))),
        #[cfg(feature = "openai")]
        ProviderKind::OpenAi => Ok(Arc::new(openai::OpenAiProvider::new(
            spec.model_id.clone(),
            api_key,
            base_url,
        ))),
        #[cfg(feature = "google")]
        ProviderKind::Google => Ok(Arc::new(google::GoogleProvider::new(
            spec.model_id.clone(),
            api_key,
            base_url,
        ))),
        #[allow(unreachable_patterns)]
        other => Err(PilotError::Configuration(format!(
            "Provider '{other}' is not enabled in this build"
        ))),
    }
}
