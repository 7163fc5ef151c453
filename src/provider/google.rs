//! Google Gemini API provider.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::PilotError;
use crate::types::{StopReason, ToolCallResult, ToolInput, ToolUse, Usage};
use crate::util::RetryPolicy;

use super::http::{drive_sse, google_headers, shared_client, SseOutcome};
use super::{DecodedToolResult, ProviderClient, ProviderRequest, ProviderResponse, TextDeltaCallback};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GoogleProvider {
    model_id: String,
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
}

impl GoogleProvider {
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
        body.insert("contents".into(), self.format_history(&request.messages).into());

        if let Some(ref system) = request.system_prompt {
            body.insert(
                "systemInstruction".into(),
                json!({ "parts": [{ "text": system }] }),
            );
        }

        let mut gen_config = Map::new();
        if let Some(max) = request.settings.max_tokens {
            gen_config.insert("maxOutputTokens".into(), max.into());
        }
        if let Some(temp) = request.settings.temperature {
            gen_config.insert("temperature".into(), temp.into());
        }
        if let Some(top_p) = request.settings.top_p {
            gen_config.insert("topP".into(), top_p.into());
        }
        if let Some(ref stops) = request.settings.stop_sequences {
            gen_config.insert("stopSequences".into(), json!(stops));
        }
        if !gen_config.is_empty() {
            body.insert("generationConfig".into(), Value::Object(gen_config));
        }

        if !request.tools.is_empty() {
            let fn_decls: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    let mut decl = json!({ "name": t.name, "description": t.description });
                    // Gemini rejects object schemas without properties.
                    if !t.schema.parameters.is_empty() {
                        decl["parameters"] = t.input_schema();
                    }
                    decl
                })
                .collect();
            body.insert("tools".into(), json!([{ "functionDeclarations": fn_decls }]));
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
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model_id
        );

        debug!(model = %self.model_id, messages = request.messages.len(), "Google stream round");

        let http_request = shared_client()
            .post(&url)
            .headers(google_headers(&self.api_key))
            .json(&body);

        let mut state = StreamState::default();
        let outcome = drive_sse(http_request, &self.retry, cancel, |data| state.handle(data, on_text_delta)).await?;

        Ok(match outcome {
            SseOutcome::Cancelled => ProviderResponse::cancelled(state.text),
            SseOutcome::Finished => state.finish(),
        })
    }
}

/// Recover tool results from the `functionResponse` parts of contents.
pub fn decode_tool_results(contents: &[Value]) -> Vec<DecodedToolResult> {
    contents
        .iter()
        .filter_map(|c| c.get("parts").and_then(|p| p.as_array()))
        .flatten()
        .filter_map(|part| part.get("functionResponse"))
        .filter_map(|fr| {
            let tool_name = fr.get("name")?.as_str()?.to_string();
            let call_id = fr
                .get("id")
                .and_then(|id| id.as_str())
                .unwrap_or(&tool_name)
                .to_string();
            let success = fr.pointer("/response/success")?.as_bool()?;
            Some(DecodedToolResult {
                call_id,
                tool_name,
                success,
            })
        })
        .collect()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
    error: Option<GeminiError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    text: Option<String>,
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Deserialize)]
struct GeminiFunctionCall {
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: ToolInput,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Deserialize)]
struct GeminiError {
    message: String,
}

#[derive(Default)]
struct StreamState {
    text: String,
    tool_uses: Vec<ToolUse>,
    finish_reason: Option<String>,
    usage: Usage,
}

impl StreamState {
    fn handle(&mut self, data: &str, on_text_delta: &TextDeltaCallback<'_>) -> Result<(), PilotError> {
        let chunk: GeminiChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(err) => {
                debug!(error = %err, "skipping malformed Gemini chunk");
                return Ok(());
            }
        };
        if let Some(error) = chunk.error {
            return Err(PilotError::Stream(error.message));
        }
        if let Some(usage) = chunk.usage_metadata {
            self.usage = Usage {
                input_tokens: usage.prompt_token_count,
                output_tokens: usage.candidates_token_count,
            };
        }

        // Only the first candidate is used.
        let Some(candidate) = chunk.candidates.into_iter().next() else {
            return Ok(());
        };
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                on_text_delta(&text);
                self.text.push_str(&text);
            }
            if let Some(call) = part.function_call {
                self.tool_uses.push(ToolUse {
                    id: call
                        .id
                        .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
                    name: call.name,
                    input: call.args,
                });
            }
        }
        if candidate.finish_reason.is_some() {
            self.finish_reason = candidate.finish_reason;
        }
        Ok(())
    }

    fn finish(self) -> ProviderResponse {
        let stop_reason = self
            .finish_reason
            .as_deref()
            .map(StopReason::from_provider)
            .unwrap_or(StopReason::EndTurn);
        ProviderResponse::completed(self.text, self.tool_uses, stop_reason, self.usage)
    }
}

#[async_trait]
impl ProviderClient for GoogleProvider {
    fn provider_name(&self) -> &str {
        "google"
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
                warn!(provider = "google", error = %err, "provider round failed");
                ProviderResponse::failure(err)
            }
        }
    }

    fn format_user_turn(&self, text: &str) -> Value {
        json!({ "role": "user", "parts": [{ "text": text }] })
    }

    fn format_assistant_turn(&self, text: Option<&str>, tool_uses: &[ToolUse]) -> Value {
        let mut parts = Vec::with_capacity(tool_uses.len() + 1);
        if let Some(text) = text.filter(|t| !t.is_empty()) {
            parts.push(json!({ "text": text }));
        }
        for tool_use in tool_uses {
            parts.push(json!({
                "functionCall": {
                    "id": tool_use.id,
                    "name": tool_use.name,
                    "args": tool_use.input,
                }
            }));
        }
        json!({ "role": "model", "parts": parts })
    }

    /// Results of a round are batched into one content of `functionResponse` parts.
    fn format_tool_results(&self, results: &[ToolCallResult]) -> Vec<Value> {
        if results.is_empty() {
            return Vec::new();
        }
        let parts: Vec<Value> = results
            .iter()
            .map(|r| {
                json!({
                    "functionResponse": {
                        "id": r.call_id,
                        "name": r.tool_name,
                        "response": r.feedback_json(),
                    }
                })
            })
            .collect();
        vec![json!({ "role": "user", "parts": parts })]
    }
}
