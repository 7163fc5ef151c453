//! Anthropic Messages API provider.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::PilotError;
use crate::tools::ToolDeclaration;
use crate::types::{input_from_value, StopReason, ToolCallResult, ToolUse, Usage};
use crate::util::RetryPolicy;

use super::http::{anthropic_headers, drive_sse, shared_client, SseOutcome};
use super::{
    decode_feedback, DecodedToolResult, ProviderClient, ProviderRequest, ProviderResponse,
    TextDeltaCallback,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    model_id: String,
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
}

impl AnthropicProvider {
    pub fn new(model_id: impl Into<String>, api_key: String, base_url: Option<String>) -> Self {
        Self {
            model_id: model_id.into(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            retry: RetryPolicy::default(),
        }
    }

    /// Override how opening the stream is retried.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn build_request_body(&self, request: &ProviderRequest) -> Value {
        let mut body = Map::new();
        body.insert("model".into(), self.model_id.clone().into());
        body.insert(
            "max_tokens".into(),
            request.settings.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS).into(),
        );
        body.insert("stream".into(), true.into());
        body.insert("messages".into(), self.format_history(&request.messages).into());

        if let Some(ref system) = request.system_prompt {
            body.insert("system".into(), system.clone().into());
        }
        if let Some(temp) = request.settings.temperature {
            body.insert("temperature".into(), temp.into());
        }
        if let Some(top_p) = request.settings.top_p {
            body.insert("top_p".into(), top_p.into());
        }
        if let Some(ref stops) = request.settings.stop_sequences {
            body.insert("stop_sequences".into(), json!(stops));
        }
        if !request.tools.is_empty() {
            body.insert("tools".into(), tool_definitions(&request.tools).into());
        }
        Value::Object(body)
    }

    async fn stream_round(
        &self,
        request: &ProviderRequest,
        on_text_delta: &TextDeltaCallback<'_>,
        cancel: &CancellationToken,
    ) -> Result<ProviderResponse, PilotError> {
        let body = self.build_request_body(request);
        let url = format!("{}/messages", self.base_url);

        debug!(model = %self.model_id, messages = request.messages.len(), "Anthropic stream round");

        let http_request = shared_client()
            .post(&url)
            .headers(anthropic_headers(&self.api_key, API_VERSION))
            .json(&body);

        let mut state = StreamState::default();
        let outcome = drive_sse(http_request, &self.retry, cancel, |data| state.handle(data, on_text_delta)).await?;

        Ok(match outcome {
            SseOutcome::Cancelled => ProviderResponse::cancelled(state.text),
            SseOutcome::Finished => state.finish(),
        })
    }
}

fn tool_definitions(tools: &[ToolDeclaration]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "input_schema": t.input_schema(),
            })
        })
        .collect()
}

/// Recover tool results from the `tool_result` blocks of user messages.
pub fn decode_tool_results(messages: &[Value]) -> Vec<DecodedToolResult> {
    messages
        .iter()
        .filter(|m| m.get("role").and_then(|r| r.as_str()) == Some("user"))
        .filter_map(|m| m.get("content").and_then(|c| c.as_array()))
        .flatten()
        .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("tool_result"))
        .filter_map(|b| {
            let call_id = b.get("tool_use_id")?.as_str()?.to_string();
            let (tool_name, success) = decode_feedback(b.get("content")?.as_str()?)?;
            let is_error = b.get("is_error").and_then(|e| e.as_bool()).unwrap_or(false);
            Some(DecodedToolResult {
                call_id,
                tool_name,
                success: success && !is_error,
            })
        })
        .collect()
}

#[derive(Default)]
struct StreamState {
    text: String,
    tool_uses: Vec<ToolUse>,
    current_tool: Option<(String, String)>,
    current_tool_input: String,
    stop_reason: Option<StopReason>,
    usage: Usage,
}

impl StreamState {
    fn handle(&mut self, data: &str, on_text_delta: &TextDeltaCallback<'_>) -> Result<(), PilotError> {
        let event: Value = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(err) => {
                debug!(error = %err, "skipping malformed Anthropic event");
                return Ok(());
            }
        };

        match event.get("type").and_then(|t| t.as_str()).unwrap_or("") {
            "message_start" => {
                if let Some(input) = event
                    .pointer("/message/usage/input_tokens")
                    .and_then(|v| v.as_u64())
                {
                    self.usage.input_tokens = input as u32;
                }
            }
            "content_block_start" => {
                let block = event.get("content_block");
                if block.and_then(|b| b.get("type")).and_then(|t| t.as_str()) == Some("tool_use") {
                    let field = |k: &str| {
                        block
                            .and_then(|b| b.get(k))
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string()
                    };
                    self.current_tool = Some((field("id"), field("name")));
                    self.current_tool_input.clear();
                }
            }
            "content_block_delta" => {
                let delta = event.get("delta");
                match delta.and_then(|d| d.get("type")).and_then(|t| t.as_str()) {
                    Some("text_delta") => {
                        if let Some(text) = delta.and_then(|d| d.get("text")).and_then(|t| t.as_str()) {
                            self.text.push_str(text);
                            on_text_delta(text);
                        }
                    }
                    Some("input_json_delta") => {
                        if let Some(json) = delta
                            .and_then(|d| d.get("partial_json"))
                            .and_then(|t| t.as_str())
                        {
                            self.current_tool_input.push_str(json);
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => {
                if let Some((id, name)) = self.current_tool.take() {
                    let raw = std::mem::take(&mut self.current_tool_input);
                    self.tool_uses.push(ToolUse {
                        id,
                        name,
                        input: input_from_value(Value::String(raw)),
                    });
                }
            }
            "message_delta" => {
                if let Some(stop) = event.pointer("/delta/stop_reason").and_then(|s| s.as_str()) {
                    self.stop_reason = Some(StopReason::from_provider(stop));
                }
                if let Some(output) = event.pointer("/usage/output_tokens").and_then(|v| v.as_u64()) {
                    self.usage.output_tokens = output as u32;
                }
            }
            "error" => {
                let message = event
                    .pointer("/error/message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown stream error");
                return Err(PilotError::Stream(message.to_string()));
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(self) -> ProviderResponse {
        ProviderResponse::completed(
            self.text,
            self.tool_uses,
            self.stop_reason.unwrap_or(StopReason::EndTurn),
            self.usage,
        )
    }
}

#[async_trait]
impl ProviderClient for AnthropicProvider {
    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn send(
        &self,
        request: &ProviderRequest,
        on_text_delta: &TextDeltaCallback<'_>,
        cancel: &CancellationToken,
    ) -> ProviderResponse {
        if cancel.is_cancelled() {
            return ProviderResponse::cancelled(String::new());
        }
        match self.stream_round(request, on_text_delta, cancel).await {
            Ok(response) => response,
            Err(err) => {
                warn!(provider = "anthropic", error = %err, "provider round failed");
                ProviderResponse::failure(err)
            }
        }
    }

    fn format_assistant_turn(&self, text: Option<&str>, tool_uses: &[ToolUse]) -> Value {
        if tool_uses.is_empty() {
            return json!({ "role": "assistant", "content": text.unwrap_or_default() });
        }
        let mut content = Vec::with_capacity(tool_uses.len() + 1);
        if let Some(text) = text.filter(|t| !t.is_empty()) {
            content.push(json!({ "type": "text", "text": text }));
        }
        for tool_use in tool_uses {
            content.push(json!({
                "type": "tool_use",
                "id": tool_use.id,
                "name": tool_use.name,
                "input": tool_use.input,
            }));
        }
        json!({ "role": "assistant", "content": content })
    }

    /// All results of a round travel back in a single user message.
    fn format_tool_results(&self, results: &[ToolCallResult]) -> Vec<Value> {
        if results.is_empty() {
            return Vec::new();
        }
        let blocks: Vec<Value> = results
            .iter()
            .map(|r| {
                json!({
                    "type": "tool_result",
                    "tool_use_id": r.call_id,
                    "content": r.feedback_json().to_string(),
                    "is_error": !r.result.success,
                })
            })
            .collect();
        vec![json!({ "role": "user", "content": blocks })]
    }
}
