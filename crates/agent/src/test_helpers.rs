//! Shared test helpers for agent tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use steward_core::error::ProviderError;
use steward_core::event::{AgentEvent, WILDCARD};
use steward_core::event_bus::{DEFAULT_PRIORITY, EventBus, handler_fn};
use steward_core::message::{Message, ToolCallRequest};
use steward_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolCallDelta, Usage,
};
use steward_core::tool::{ToolExecutor, ToolResult};

/// One scripted provider turn.
pub enum Scripted {
    Reply(ProviderResponse),
    Fail(ProviderError),
    /// Never answers
    Hang,
    /// Streams these chunks, then closes
    Chunks(Vec<StreamChunk>),
    /// Streams these chunks, then goes silent with the stream open
    Stall(Vec<StreamChunk>),
}

/// A mock provider that plays a script, one entry per call.
///
/// Panics if more calls are made than entries provided.
pub struct SequentialMockProvider {
    script: Mutex<VecDeque<Scripted>>,
    call_count: Mutex<usize>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            call_count: Mutex::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replies(responses: Vec<ProviderResponse>) -> Self {
        Self::new(responses.into_iter().map(Scripted::Reply).collect())
    }

    pub fn single_text(text: &str) -> Self {
        Self::replies(vec![make_text_response(text)])
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: ProviderRequest) -> Scripted {
        let mut count = self.call_count.lock().unwrap();
        *count += 1;
        self.requests.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("SequentialMockProvider: no more responses (call #{count})"))
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        match self.next(request) {
            Scripted::Reply(response) => Ok(response),
            Scripted::Fail(e) => Err(e),
            Scripted::Hang => std::future::pending().await,
            Scripted::Chunks(_) | Scripted::Stall(_) => {
                panic!("SequentialMockProvider: chunk script used for a blocking call")
            }
        }
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let (chunks, stall) = match self.next(request) {
            Scripted::Reply(response) => (vec![response_chunk(response)], false),
            Scripted::Fail(e) => return Err(e),
            Scripted::Hang => std::future::pending().await,
            Scripted::Chunks(chunks) => (chunks, false),
            Scripted::Stall(chunks) => (chunks, true),
        };
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        tokio::spawn(async move {
            for chunk in chunks {
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
            if stall {
                tx.closed().await;
            }
        });
        Ok(rx)
    }
}

fn response_chunk(response: ProviderResponse) -> StreamChunk {
    let tool_calls = response
        .message
        .tool_calls()
        .iter()
        .enumerate()
        .map(|(index, call)| ToolCallDelta {
            index,
            id: Some(call.id.clone()),
            name: Some(call.name.clone()),
            arguments: Some(call.arguments.clone()),
        })
        .collect();
    StreamChunk {
        content: Some(response.message.content().to_string()),
        reasoning: response.reasoning,
        tool_calls,
        done: true,
        usage: response.usage,
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage::new(10, 5)),
        model: "mock-model".into(),
        reasoning: None,
    }
}

/// Create a response requesting tool calls.
pub fn make_tool_call_response(tool_calls: Vec<ToolCallRequest>, thought: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_tool_calls(thought, tool_calls),
        usage: Some(Usage::new(10, 5)),
        model: "mock-model".into(),
        reasoning: None,
    }
}

pub fn make_tool_call(id: &str, name: &str, args: serde_json::Value) -> ToolCallRequest {
    ToolCallRequest::new(id, name, args.to_string())
}

pub fn text_chunk(text: &str) -> StreamChunk {
    StreamChunk {
        content: Some(text.into()),
        ..Default::default()
    }
}

/// Tool executor with `<tool>_<action>` function names and scripted results.
///
/// Unscripted calls succeed with `"ok: <function>"`.
pub struct ScriptedToolExecutor {
    functions: Vec<String>,
    results: Mutex<HashMap<String, VecDeque<ToolResult>>>,
    calls: Mutex<Vec<(String, serde_json::Value)>>,
}

impl ScriptedToolExecutor {
    pub fn new(functions: &[&str]) -> Self {
        Self {
            functions: functions.iter().map(|f| f.to_string()).collect(),
            results: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_result(self, function: &str, result: ToolResult) -> Self {
        self.results
            .lock()
            .unwrap()
            .entry(function.to_string())
            .or_default()
            .push_back(result);
        self
    }

    pub fn calls(&self) -> Vec<(String, serde_json::Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for ScriptedToolExecutor {
    fn all_schemas(&self) -> Vec<serde_json::Value> {
        self.functions
            .iter()
            .map(|name| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": name,
                        "description": format!("Test function {name}"),
                        "parameters": {"type": "object", "properties": {}}
                    }
                })
            })
            .collect()
    }

    fn resolve_function_name(&self, function_name: &str) -> Option<(String, String)> {
        if !self.functions.iter().any(|f| f == function_name) {
            return None;
        }
        let (tool, action) = function_name.split_once('_')?;
        Some((tool.to_string(), action.to_string()))
    }

    async fn call_function(&self, function_name: &str, arguments: serde_json::Value) -> ToolResult {
        self.calls
            .lock()
            .unwrap()
            .push((function_name.to_string(), arguments));
        self.results
            .lock()
            .unwrap()
            .get_mut(function_name)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| ToolResult::success(format!("ok: {function_name}")))
    }
}

/// Record every event published on `bus`.
pub async fn record_events(bus: &EventBus) -> Arc<Mutex<Vec<AgentEvent>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    bus.subscribe(
        WILDCARD,
        handler_fn(move |event| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(event);
                Ok(())
            }
        }),
        DEFAULT_PRIORITY,
    )
    .await;
    log
}

/// Event types in publish order.
pub fn event_types(log: &Mutex<Vec<AgentEvent>>) -> Vec<&'static str> {
    log.lock().unwrap().iter().map(AgentEvent::event_type).collect()
}
