//! OpenAI Chat Completions API provider.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::PilotError;
use crate::types::{input_from_value, StopReason, ToolCallResult, ToolUse, Usage};
use crate::util::RetryPolicy;

use super::http::{bearer_headers, drive_sse, shared_client, SseOutcome};
use super::{
    decode_feedback, DecodedToolResult, ProviderClient, ProviderRequest, ProviderResponse,
    TextDeltaCallback,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    model_id: String,
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
}

impl OpenAiProvider {
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
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(ref system) = request.system_prompt {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.extend(self.format_history(&request.messages));

        let mut body = Map::new();
        body.insert("model".into(), self.model_id.clone().into());
        body.insert("messages".into(), messages.into());
        body.insert("stream".into(), true.into());
        body.insert("stream_options".into(), json!({ "include_usage": true }));

        if let Some(max) = request.settings.max_tokens {
            body.insert("max_completion_tokens".into(), max.into());
        }
        if let Some(temp) = request.settings.temperature {
            body.insert("temperature".into(), temp.into());
        }
        if let Some(top_p) = request.settings.top_p {
            body.insert("top_p".into(), top_p.into());
        }
        if let Some(ref stops) = request.settings.stop_sequences {
            body.insert("stop".into(), json!(stops));
        }
        if !request.tools.is_empty() {
            let tool_defs: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema(),
                        }
                    })
                })
                .collect();
            body.insert("tools".into(), tool_defs.into());
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
        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %self.model_id, messages = request.messages.len(), "OpenAI stream round");

        let http_request = shared_client()
            .post(&url)
            .headers(bearer_headers(&self.api_key))
            .json(&body);

        let mut state = StreamState::default();
        let outcome = drive_sse(http_request, &self.retry, cancel, |data| state.handle(data, on_text_delta)).await?;

        Ok(match outcome {
            SseOutcome::Cancelled => ProviderResponse::cancelled(state.text),
            SseOutcome::Finished => state.finish(),
        })
    }
}

/// Recover tool results from `role: "tool"` messages.
pub fn decode_tool_results(messages: &[Value]) -> Vec<DecodedToolResult> {
    messages
        .iter()
        .filter(|m| m.get("role").and_then(|r| r.as_str()) == Some("tool"))
        .filter_map(|m| {
            let call_id = m.get("tool_call_id")?.as_str()?.to_string();
            let (tool_name, success) = decode_feedback(m.get("content")?.as_str()?)?;
            Some(DecodedToolResult {
                call_id,
                tool_name,
                success,
            })
        })
        .collect()
}

#[derive(Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    usage: Option<OpenAiUsage>,
    error: Option<OpenAiError>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct OpenAiStreamDelta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OpenAiToolCallDelta>,
}

#[derive(Deserialize)]
struct OpenAiToolCallDelta {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<OpenAiFunctionDelta>,
}

#[derive(Deserialize)]
struct OpenAiFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAiError {
    message: String,
}

#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

#[derive(Default)]
struct StreamState {
    text: String,
    /// Tool call fragments keyed by their stream index.
    tool_calls: BTreeMap<usize, PartialToolCall>,
    finish_reason: Option<String>,
    usage: Usage,
}

impl StreamState {
    fn handle(&mut self, data: &str, on_text_delta: &TextDeltaCallback<'_>) -> Result<(), PilotError> {
        let chunk: OpenAiStreamChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(err) => {
                debug!(error = %err, "skipping malformed OpenAI chunk");
                return Ok(());
            }
        };
        if let Some(error) = chunk.error {
            return Err(PilotError::Stream(error.message));
        }
        if let Some(usage) = chunk.usage {
            self.usage = Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            };
        }

        for choice in chunk.choices {
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                on_text_delta(&text);
                self.text.push_str(&text);
            }
            for delta in choice.delta.tool_calls {
                let entry = self.tool_calls.entry(delta.index).or_default();
                if let Some(id) = delta.id {
                    entry.id = id;
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        entry.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        entry.arguments.push_str(&arguments);
                    }
                }
            }
            if choice.finish_reason.is_some() {
                self.finish_reason = choice.finish_reason;
            }
        }
        Ok(())
    }

    fn finish(self) -> ProviderResponse {
        let tool_uses = self
            .tool_calls
            .into_values()
            .filter(|call| !call.name.is_empty())
            .map(|call| ToolUse {
                id: call.id,
                name: call.name,
                input: input_from_value(Value::String(call.arguments)),
            })
            .collect();
        let stop_reason = self
            .finish_reason
            .as_deref()
            .map(StopReason::from_provider)
            .unwrap_or(StopReason::EndTurn);
        ProviderResponse::completed(self.text, tool_uses, stop_reason, self.usage)
    }
}

#[async_trait]
impl ProviderClient for OpenAiProvider {
    fn provider_name(&self) -> &str {
        "openai"
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
                warn!(provider = "openai", error = %err, "provider round failed");
                ProviderResponse::failure(err)
            }
        }
    }

    fn format_assistant_turn(&self, text: Option<&str>, tool_uses: &[ToolUse]) -> Value {
        let mut msg = Map::new();
        msg.insert("role".into(), "assistant".into());
        msg.insert(
            "content".into(),
            text.filter(|t| !t.is_empty())
                .map(|t| Value::String(t.to_string()))
                .unwrap_or(Value::Null),
        );
        if !tool_uses.is_empty() {
            let calls: Vec<Value> = tool_uses
                .iter()
                .map(|t| {
                    json!({
                        "id": t.id,
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "arguments": Value::Object(t.input.clone()).to_string(),
                        }
                    })
                })
                .collect();
            msg.insert("tool_calls".into(), calls.into());
        }
        Value::Object(msg)
    }

    /// One `tool` message per result, correlated by `tool_call_id`.
    fn format_tool_results(&self, results: &[ToolCallResult]) -> Vec<Value> {
        results
            .iter()
            .map(|r| {
                json!({
                    "role": "tool",
                    "tool_call_id": r.call_id,
                    "content": r.feedback_json().to_string(),
                })
            })
            .collect()
    }
}
