//! Shared test helpers: a scripted provider and an in-memory host.
#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use hostpilot::agent_loop::{AgentEvent, AgentEventSink};
use hostpilot::bridge::{HostBridge, HostThread};
use hostpilot::provider::{ProviderClient, ProviderRequest, ProviderResponse, TextDeltaCallback};
use hostpilot::tools::{FnTool, HostContext, ToolRegistry, ToolSchema};
use hostpilot::types::*;

/// One canned provider round.
pub enum Round {
    /// Stream the chunks, then finish the turn.
    Text(Vec<String>),
    /// Optional text, then request the given tools.
    Tools { text: String, uses: Vec<ToolUse> },
    /// Fail the round with this error.
    Fail(String),
    /// Stream the chunks, then hang until cancelled.
    Stall(Vec<String>),
}

/// Provider that plays back queued rounds and records every request.
#[derive(Default)]
pub struct ScriptedProvider {
    rounds: Mutex<VecDeque<Round>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(self, text: &str) -> Self {
        self.push(Round::Text(vec![text.to_string()]))
    }

    pub fn chunks(self, chunks: &[&str]) -> Self {
        self.push(Round::Text(chunks.iter().map(|c| c.to_string()).collect()))
    }

    pub fn tool_call(self, id: &str, name: &str, input: Value) -> Self {
        self.push(Round::Tools {
            text: String::new(),
            uses: vec![tool_use(id, name, input)],
        })
    }

    pub fn tool_calls(self, text: &str, uses: Vec<ToolUse>) -> Self {
        self.push(Round::Tools {
            text: text.to_string(),
            uses,
        })
    }

    pub fn fail(self, error: &str) -> Self {
        self.push(Round::Fail(error.to_string()))
    }

    pub fn stall(self, chunks: &[&str]) -> Self {
        self.push(Round::Stall(chunks.iter().map(|c| c.to_string()).collect()))
    }

    fn push(self, round: Round) -> Self {
        self.rounds.lock().unwrap().push_back(round);
        self
    }

    /// Number of `send` calls so far.
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Message history of the `n`th request.
    pub fn request(&self, n: usize) -> Vec<Message> {
        self.requests.lock().unwrap()[n].clone()
    }
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        "scripted-1"
    }

    async fn send(
        &self,
        request: &ProviderRequest,
        on_text_delta: &TextDeltaCallback<'_>,
        cancel: &CancellationToken,
    ) -> ProviderResponse {
        self.requests.lock().unwrap().push(request.messages.clone());
        let round = self.rounds.lock().unwrap().pop_front();
        let usage = Usage {
            input_tokens: 10,
            output_tokens: 5,
        };
        match round {
            None => ProviderResponse::failure("script exhausted"),
            Some(Round::Fail(error)) => ProviderResponse::failure(error),
            Some(Round::Text(chunks)) => {
                for chunk in &chunks {
                    on_text_delta(chunk);
                }
                ProviderResponse::completed(chunks.concat(), Vec::new(), StopReason::EndTurn, usage)
            }
            Some(Round::Tools { text, uses }) => {
                if !text.is_empty() {
                    on_text_delta(&text);
                }
                ProviderResponse::completed(text, uses, StopReason::ToolUse, usage)
            }
            Some(Round::Stall(chunks)) => {
                for chunk in &chunks {
                    on_text_delta(chunk);
                }
                cancel.cancelled().await;
                ProviderResponse::cancelled(chunks.concat())
            }
        }
    }

    fn format_assistant_turn(&self, text: Option<&str>, tool_uses: &[ToolUse]) -> Value {
        json!({ "role": "assistant", "text": text, "tools": tool_uses.len() })
    }

    fn format_tool_results(&self, results: &[ToolCallResult]) -> Vec<Value> {
        results.iter().map(|r| r.feedback_json()).collect()
    }
}

pub fn tool_use(id: &str, name: &str, input: Value) -> ToolUse {
    ToolUse {
        id: id.to_string(),
        name: name.to_string(),
        input: input_from_value(input),
    }
}

/// In-memory spreadsheet host.
#[derive(Debug, Default)]
pub struct Workbook {
    pub sheets: Vec<String>,
    pub cells: BTreeMap<String, i64>,
    pub closed: bool,
}

impl Workbook {
    pub fn with_sheets(names: &[&str]) -> Self {
        Self {
            sheets: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }
}

impl HostContext for Workbook {
    fn is_available(&self) -> bool {
        !self.closed
    }
}

/// `list_sheets`, `set_cell`, `explode` (panics).
pub fn workbook_tools() -> ToolRegistry<Workbook> {
    ToolRegistry::new()
        .with(FnTool::new(
            "list_sheets",
            "List the sheets of the open workbook.",
            ToolSchema::empty(),
            |book: &mut Workbook, _| ToolResult::success(book.sheets.join(", ")),
        ))
        .with(FnTool::new(
            "set_cell",
            "Set a cell to an integer value.",
            ToolSchema::object()
                .string("cell", "Cell reference, e.g. A1", true)
                .integer("value", "New value", true)
                .build(),
            |book: &mut Workbook, args| {
                let cell = match args.get_str("cell") {
                    Ok(cell) => cell.to_string(),
                    Err(err) => return err.into(),
                };
                let value = match args.get_i64("value") {
                    Ok(value) => value,
                    Err(err) => return err.into(),
                };
                book.cells.insert(cell.clone(), value);
                ToolResult::success(format!("{cell} = {value}"))
            },
        ))
        .with(FnTool::new(
            "explode",
            "Always panics.",
            ToolSchema::empty(),
            |_: &mut Workbook, _| panic!("formula engine crashed"),
        ))
}

/// Bridge over `registry` drained by a dedicated host thread.
pub fn spawn_host(
    registry: ToolRegistry<Workbook>,
    host: Workbook,
    timeout: Duration,
) -> (Arc<HostBridge<Workbook>>, HostThread<Workbook>) {
    let (bridge, wakeup) = HostBridge::with_wake_channel(registry);
    let bridge = Arc::new(bridge.with_timeout(timeout));
    let thread = HostThread::spawn(bridge.clone(), wakeup, host).expect("spawn host thread");
    (bridge, thread)
}

/// Event sink that records everything it receives.
pub fn recording_sink() -> (AgentEventSink, Arc<Mutex<Vec<AgentEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let seen = events.clone();
    let sink: AgentEventSink = Arc::new(move |event| seen.lock().unwrap().push(event));
    (sink, events)
}
