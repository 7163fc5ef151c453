//! Shared HTTP client, SSE decoding, and auth header utilities.

use std::sync::OnceLock;

use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tokio_util::sync::CancellationToken;

use crate::error::PilotError;
use crate::util::RetryPolicy;

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(15))
            .pool_max_idle_per_host(4)
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "falling back to default HTTP client");
                reqwest::Client::new()
            })
    })
}

/// Build default headers for a Bearer-token API.
pub fn bearer_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
        headers.insert(AUTHORIZATION, val);
    }
    headers
}

/// Build Anthropic-style headers (x-api-key).
pub fn anthropic_headers(api_key: &str, version: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(api_key) {
        headers.insert("x-api-key", val);
    }
    if let Ok(val) = HeaderValue::from_str(version) {
        headers.insert("anthropic-version", val);
    }
    headers
}

/// Build Gemini-style headers (x-goog-api-key).
pub fn google_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(api_key) {
        headers.insert("x-goog-api-key", val);
    }
    headers
}

/// Parse an SSE "data:" line, returning None for other fields and "[DONE]".
pub fn parse_sse_data(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data == "[DONE]" {
        return None;
    }
    Some(data)
}

/// Map a non-success HTTP status to an error.
pub fn status_to_error(status: u16, body: &str) -> PilotError {
    match status {
        401 | 403 => PilotError::Authentication(error_message(body)),
        429 => PilotError::RateLimited {
            retry_after_ms: extract_retry_after(body),
        },
        _ => PilotError::api(status, error_message(body)),
    }
}

/// Pull `error.message` out of a JSON error body, or return the body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

fn extract_retry_after(body: &str) -> Option<u64> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("retry_after"))
                .and_then(|r| r.as_f64())
                .map(|s| (s * 1000.0) as u64)
        })
}

/// Incremental line decoder for `text/event-stream` bodies.
///
/// Buffers raw bytes so a UTF-8 sequence split across network chunks is
/// decoded only once its line is complete.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed a chunk, returning the data payloads of every completed line.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            if let Some(data) = decode_line(&line) {
                events.push(data);
            }
        }
        events
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest).into_iter().collect()
    }
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    parse_sse_data(line).map(str::to_string)
}

/// Turn a streaming response body into its SSE data payloads.
pub fn sse_data_stream(resp: reqwest::Response) -> BoxStream<'static, Result<String, PilotError>> {
    let byte_stream = resp.bytes_stream();
    let stream = async_stream::stream! {
        futures::pin_mut!(byte_stream);
        let mut decoder = SseDecoder::default();
        while let Some(chunk_result) = byte_stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    yield Err(PilotError::from(e));
                    return;
                }
            };
            for data in decoder.push(&chunk) {
                yield Ok(data);
            }
        }
        for data in decoder.finish() {
            yield Ok(data);
        }
    };
    Box::pin(stream)
}

/// How an SSE exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseOutcome {
    Finished,
    Cancelled,
}

/// Send `request` and feed every SSE data payload to `on_data`, in order,
/// until the body ends, `on_data` fails, or `cancel` fires.
///
/// Opening the stream is retried per `retry`; once payloads flow nothing
/// is retried.
pub async fn drive_sse<F>(
    request: reqwest::RequestBuilder,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
    mut on_data: F,
) -> Result<SseOutcome, PilotError>
where
    F: FnMut(&str) -> Result<(), PilotError>,
{
    let resp = tokio::select! {
        _ = cancel.cancelled() => return Ok(SseOutcome::Cancelled),
        resp = retry.execute(|| open_stream(&request)) => resp?,
    };

    let mut events = sse_data_stream(resp);
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Ok(SseOutcome::Cancelled),
            next = events.next() => next,
        };
        match next {
            Some(data) => on_data(&data?)?,
            None => return Ok(SseOutcome::Finished),
        }
    }
}

async fn open_stream(request: &reqwest::RequestBuilder) -> Result<reqwest::Response, PilotError> {
    let request = request
        .try_clone()
        .ok_or_else(|| PilotError::InvalidState("request body cannot be replayed".to_string()))?;
    let resp = request.send().await?;
    let status = resp.status().as_u16();
    if !(200..300).contains(&status) {
        let body_text = resp.text().await.unwrap_or_default();
        return Err(status_to_error(status, &body_text));
    }
    Ok(resp)
}
