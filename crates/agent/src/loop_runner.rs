//! The agent reasoning loop.
//!
//! One `chat` call is one user turn: pick a model, then alternate model
//! calls and tool executions until the model answers without tool calls,
//! the step budget runs out, or tool failures pile up. Every exit path
//! produces an [`AgentResponse`]; model and tool failures are reported as
//! events and user-facing text, never raised.

use std::sync::Arc;
use std::time::Duration;

use steward_config::{AgentSettings, AppConfig};
use steward_core::error::ProviderError;
use steward_core::event::AgentEvent;
use steward_core::event_bus::EventBus;
use steward_core::message::{Message, ToolCallRequest};
use steward_core::tool::{ToolExecutor, ToolResult};
use steward_providers::{ModelConfig, ModelRegistry, ModelSelector};
use steward_telemetry::{CostTracker, UsageRecord};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};
use tracing::{debug, error, info, warn};

use crate::accumulator::ToolCallAccumulator;
use crate::context::estimate_message_tokens;
use crate::files::detect_generated_file;
use crate::response::{AgentResponse, AgentStep, TurnOutcome};
use crate::session::SessionManager;
use crate::stream_event::AgentStreamEvent;

/// Task anchoring starts at this step index.
const ANCHOR_FIRST_STEP: usize = 3;
const PREVIEW_CHARS: usize = 100;
const EVENT_OUTPUT_CHARS: usize = 500;

pub const STEP_LIMIT_MESSAGE: &str =
    "(The task reached the step limit; please split it into smaller tasks)";

type StreamSink = mpsc::Sender<AgentStreamEvent>;

/// The ReAct agent.
///
/// Owns the session manager it converses through; everything else is
/// shared and injected.
pub struct Agent {
    registry: Arc<ModelRegistry>,
    selector: Arc<ModelSelector>,
    tools: Arc<dyn ToolExecutor>,
    event_bus: Arc<EventBus>,
    sessions: SessionManager,
    cost_tracker: Arc<CostTracker>,
    settings: AgentSettings,
    /// Pinned model; `None` lets the selector decide per turn
    model_key: Option<String>,
}

/// A model call that produced an answer.
struct ModelReply {
    content: String,
    tool_calls: Vec<ToolCallRequest>,
    usage: Option<UsageRecord>,
}

enum ModelFailure {
    /// The whole call, or the gap between two chunks, ran out of time.
    Timeout { secs: u64, stalled: bool },
    Provider(ProviderError),
}

impl ModelFailure {
    fn error_type(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "TimeoutError",
            Self::Provider(e) => e.error_type(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Timeout { secs, stalled: false } => format!("Model call timed out ({secs}s)"),
            Self::Timeout { secs, stalled: true } => {
                format!("Model stream stalled: no chunk for {secs}s")
            }
            Self::Provider(e) => e.to_string(),
        }
    }

    fn user_message(&self, streaming: bool) -> String {
        match self {
            Self::Timeout { .. } if streaming => {
                "Sorry, the AI model timed out. Please try again later.".to_string()
            }
            Self::Timeout { .. } => {
                "Sorry, the AI model timed out. Please try again later or simplify your request."
                    .to_string()
            }
            Self::Provider(e) => format!("Sorry, the model call failed: {e}"),
        }
    }
}

impl Agent {
    /// Create an agent with default settings, a private event bus, a fresh
    /// session manager and an unlimited cost tracker.
    pub fn new(selector: Arc<ModelSelector>, tools: Arc<dyn ToolExecutor>) -> Self {
        Self {
            registry: selector.registry().clone(),
            selector,
            tools,
            event_bus: Arc::new(EventBus::new()),
            sessions: SessionManager::new(Default::default()),
            cost_tracker: Arc::new(CostTracker::new(0.0)),
            settings: AgentSettings::default(),
            model_key: None,
        }
    }

    /// Wire an agent from configuration. Sessions publish on `event_bus` too.
    pub fn from_config(
        config: &AppConfig,
        selector: Arc<ModelSelector>,
        tools: Arc<dyn ToolExecutor>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let sessions = SessionManager::new(config.session.clone()).with_event_bus(event_bus.clone());
        Self::new(selector, tools)
            .with_event_bus(event_bus)
            .with_session_manager(sessions)
            .with_cost_tracker(Arc::new(CostTracker::new(config.budget.daily_limit_usd)))
            .with_settings(config.agent.clone())
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = bus;
        self
    }

    pub fn with_session_manager(mut self, sessions: SessionManager) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_cost_tracker(mut self, tracker: Arc<CostTracker>) -> Self {
        self.cost_tracker = tracker;
        self
    }

    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Always use this model instead of asking the selector.
    pub fn with_model_key(mut self, key: impl Into<String>) -> Self {
        self.model_key = Some(key.into());
        self
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn selector(&self) -> &Arc<ModelSelector> {
        &self.selector
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn cost_tracker(&self) -> &Arc<CostTracker> {
        &self.cost_tracker
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn session_manager(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn session_manager_mut(&mut self) -> &mut SessionManager {
        &mut self.sessions
    }

    /// Clear the current session's history.
    pub async fn reset(&mut self) {
        self.sessions.clear_messages().await;
    }

    /// Run one turn with blocking model calls.
    pub async fn chat(&mut self, input: &str) -> AgentResponse {
        self.run(input, None).await
    }

    /// Run one turn with streamed model calls. Text deltas, tool activity
    /// and any closing status text go to `sink`, followed by `Done`.
    pub async fn chat_stream(&mut self, input: &str, sink: StreamSink) -> AgentResponse {
        let response = self.run(input, Some(&sink)).await;
        let _ = sink
            .send(AgentStreamEvent::Done {
                session_id: response.session_id.clone(),
                total_steps: response.total_steps,
                total_tokens: response.total_tokens,
                tool_calls_made: response.tool_calls_count,
            })
            .await;
        response
    }

    async fn run(&mut self, input: &str, sink: Option<&StreamSink>) -> AgentResponse {
        let session_id = self.sessions.current_session_id().to_string();
        let mut response = AgentResponse::new(&session_id);

        self.sessions.add_user_message(input).await;
        self.emit(AgentEvent::UserInput {
            text: input.to_string(),
            session_id: session_id.clone(),
        })
        .await;

        let schemas = self.tools.all_schemas();
        let model = match self.selector.select_for_task(
            !schemas.is_empty(),
            false,
            self.model_key.as_deref(),
        ) {
            Ok(model) => model,
            Err(e) => {
                error!(session_id = %session_id, error = %e, "No model available");
                self.emit(AgentEvent::ModelError {
                    source: "selector".into(),
                    message: e.to_string(),
                    error_type: "SelectionError".into(),
                    session_id,
                })
                .await;
                response.content = format!("Sorry, no model is available: {e}");
                say(sink, &response.content).await;
                return response;
            }
        };
        debug!(model_key = %model.key, tools = schemas.len(), "Turn started");

        let max_steps = self.settings.max_steps;
        let mut failure_streak = 0;

        for step_idx in 0..max_steps {
            response.total_steps = step_idx + 1;
            self.emit(AgentEvent::AgentThinking {
                step: step_idx + 1,
                max_steps,
                model_key: model.key.clone(),
                session_id: session_id.clone(),
            })
            .await;

            let anchor = self.task_anchor(input, step_idx, &response, failure_streak);
            // leave room for the anchor under the safety margin
            let reserve = anchor.as_ref().map_or(0, estimate_message_tokens) * 2;
            let window = model.context_window.saturating_sub(reserve).max(1);
            let mut messages = self.sessions.get_messages(Some(window));
            messages.extend(anchor);

            self.emit(AgentEvent::ModelCall {
                model_key: model.key.clone(),
                model_id: model.id.clone(),
                message_count: messages.len(),
                has_tools: !schemas.is_empty() && model.supports_function_calling,
                session_id: session_id.clone(),
            })
            .await;

            let reply = match sink {
                Some(tx) => self.stream_model(&model, messages, &schemas, &session_id, tx).await,
                None => self.call_model(&model, messages, &schemas, &session_id).await,
            };
            let reply = match reply {
                Ok(reply) => reply,
                Err(failure) => return self.model_failed(&model, failure, response, sink).await,
            };

            if let Some(usage) = &reply.usage {
                self.account(usage, &mut response).await;
            }

            self.emit(AgentEvent::ModelResponse {
                model_key: model.key.clone(),
                has_tool_calls: !reply.tool_calls.is_empty(),
                content_preview: reply.content.chars().take(PREVIEW_CHARS).collect(),
                session_id: session_id.clone(),
            })
            .await;

            if reply.tool_calls.is_empty() {
                self.sessions
                    .add_assistant_message(&reply.content, Vec::new())
                    .await;
                response.steps.push(AgentStep::Response {
                    content: reply.content.clone(),
                });
                response.content = reply.content;
                response.outcome = TurnOutcome::Responded;

                self.emit(AgentEvent::AgentResponse {
                    content: response.content.clone(),
                    total_steps: response.total_steps,
                    total_tokens: response.total_tokens,
                    tool_calls_count: response.tool_calls_count,
                    session_id: session_id.clone(),
                })
                .await;
                info!(
                    session_id = %session_id,
                    steps = response.total_steps,
                    tool_calls = response.tool_calls_count,
                    tokens = response.total_tokens,
                    "Turn completed"
                );
                return response;
            }

            let calls = reply.tool_calls;
            self.sessions
                .add_assistant_message(&reply.content, calls.clone())
                .await;

            let max_tools = self.settings.max_tools_per_call;
            if calls.len() > max_tools {
                warn!(
                    session_id = %session_id,
                    requested = calls.len(),
                    max_tools,
                    "Too many tool calls in one step, rejecting all"
                );
                let notice = format!(
                    "[system] {} tool calls in one step exceeds the limit of {max_tools}; \
                     call at most {max_tools} tools per step.",
                    calls.len()
                );
                for call in &calls {
                    self.sessions.add_tool_message(&call.id, &notice).await;
                }
                continue;
            }

            for (i, call) in calls.iter().enumerate() {
                let result = self.execute_tool(call, &mut response, sink).await;
                if result.is_success() {
                    failure_streak = 0;
                } else {
                    failure_streak += 1;
                }

                let limit = self.settings.max_consecutive_failures;
                if limit > 0 && failure_streak >= limit {
                    let cancelled = ToolResult::cancelled().to_message();
                    for rest in &calls[i + 1..] {
                        self.sessions.add_tool_message(&rest.id, &cancelled).await;
                    }
                    return self.abort_on_failures(failure_streak, response, sink).await;
                }
            }
        }

        warn!(session_id = %session_id, max_steps, "Reached the maximum step limit");
        response.content = STEP_LIMIT_MESSAGE.to_string();
        response.outcome = TurnOutcome::StepLimitReached;
        self.sessions
            .add_assistant_message(&response.content, Vec::new())
            .await;
        self.emit(AgentEvent::AgentError {
            source: "agent".into(),
            message: "Reached the maximum step limit".into(),
            session_id,
        })
        .await;
        say(sink, &response.content).await;
        response
    }

    /// Transient reminder of the original request, appended to the window
    /// sent to the model and never stored.
    fn task_anchor(
        &self,
        input: &str,
        step_idx: usize,
        response: &AgentResponse,
        failure_streak: usize,
    ) -> Option<Message> {
        let interval = self.settings.anchor_interval;
        if interval == 0 || step_idx < ANCHOR_FIRST_STEP || step_idx % interval != 0 {
            return None;
        }
        Some(Message::user(format!(
            "[Task status] Original request: {input}\n\
             Completed {step_idx} steps, {} tool calls, {failure_streak} consecutive failures\n\
             Keep working on this task and avoid unrelated actions.",
            response.tool_calls_count
        )))
    }

    async fn call_model(
        &self,
        model: &ModelConfig,
        messages: Vec<Message>,
        schemas: &[serde_json::Value],
        session_id: &str,
    ) -> Result<ModelReply, ModelFailure> {
        let secs = self.settings.inference_timeout_secs;
        let chat = timeout(
            Duration::from_secs(secs),
            self.registry.chat(&model.key, messages, schemas),
        )
        .await
        .map_err(|_| ModelFailure::Timeout {
            secs,
            stalled: false,
        })?
        .map_err(ModelFailure::Provider)?;

        if let Some(reasoning) = chat.reasoning.filter(|r| !r.is_empty()) {
            self.emit(AgentEvent::ModelReasoning {
                reasoning,
                is_delta: false,
                is_complete: true,
                session_id: session_id.to_string(),
            })
            .await;
        }

        Ok(ModelReply {
            content: chat.message.content().to_string(),
            tool_calls: chat.message.tool_calls().to_vec(),
            usage: Some(chat.usage),
        })
    }

    /// Drain one streamed model call. The overall timeout bounds the whole
    /// call; each chunk must also arrive within the chunk timeout.
    async fn stream_model(
        &self,
        model: &ModelConfig,
        messages: Vec<Message>,
        schemas: &[serde_json::Value],
        session_id: &str,
        sink: &StreamSink,
    ) -> Result<ModelReply, ModelFailure> {
        let overall_secs = self.settings.inference_timeout_secs;
        let overall = Duration::from_secs(overall_secs);
        let chunk_secs = if model.is_local() {
            self.settings.local_stream_chunk_timeout_secs
        } else {
            self.settings.stream_chunk_timeout_secs
        };
        let chunk_limit = Duration::from_secs(chunk_secs);
        let deadline = Instant::now() + overall;

        let mut rx = timeout(overall, self.registry.chat_stream(&model.key, messages, schemas))
            .await
            .map_err(|_| ModelFailure::Timeout {
                secs: overall_secs,
                stalled: false,
            })?
            .map_err(ModelFailure::Provider)?;

        let mut content = String::new();
        let mut reasoning = String::new();
        let mut accumulator = ToolCallAccumulator::new();
        let mut usage = None;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let stalled = chunk_limit < remaining;
            let wait = if stalled { chunk_limit } else { remaining };

            let next = timeout(wait, rx.recv()).await.map_err(|_| ModelFailure::Timeout {
                secs: if stalled { chunk_secs } else { overall_secs },
                stalled,
            })?;
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(ModelFailure::Provider)?;

            if let Some(delta) = chunk.reasoning.filter(|r| !r.is_empty()) {
                reasoning.push_str(&delta);
                self.emit(AgentEvent::ModelReasoning {
                    reasoning: delta,
                    is_delta: true,
                    is_complete: false,
                    session_id: session_id.to_string(),
                })
                .await;
            }
            if let Some(text) = chunk.content.filter(|c| !c.is_empty()) {
                content.push_str(&text);
                let _ = sink.send(AgentStreamEvent::Chunk { content: text }).await;
            }
            accumulator.extend(&chunk.tool_calls);
            if chunk.usage.is_some() {
                usage = chunk.usage;
            }
            if chunk.done {
                break;
            }
        }

        self.emit(AgentEvent::ModelReasoning {
            reasoning,
            is_delta: false,
            is_complete: true,
            session_id: session_id.to_string(),
        })
        .await;

        // a stream that never reported usage still counts as one call
        let usage = self
            .registry
            .record_stream_usage(&model.key, usage.unwrap_or_default());
        Ok(ModelReply {
            content,
            tool_calls: accumulator.finalize(),
            usage,
        })
    }

    async fn account(&mut self, usage: &UsageRecord, response: &mut AgentResponse) {
        let tokens = u64::from(usage.total_tokens);
        response.total_tokens += tokens;
        self.sessions.update_tokens(tokens);
        self.cost_tracker.record(usage, &response.session_id, None);
        self.emit(AgentEvent::ModelUsage {
            model_key: usage.model_key.clone(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            cost: usage.cost,
            session_id: response.session_id.clone(),
        })
        .await;
    }

    async fn execute_tool(
        &mut self,
        call: &ToolCallRequest,
        response: &mut AgentResponse,
        sink: Option<&StreamSink>,
    ) -> ToolResult {
        let session_id = response.session_id.clone();
        let arguments = call.parsed_arguments();
        let (tool_name, action_name) = self
            .tools
            .resolve_function_name(&call.name)
            .unwrap_or_else(|| (call.name.clone(), String::new()));
        response.tool_calls_count += 1;

        self.emit(AgentEvent::ToolCall {
            tool_name: tool_name.clone(),
            action_name: action_name.clone(),
            arguments: arguments.clone(),
            function_name: call.name.clone(),
            session_id: session_id.clone(),
        })
        .await;
        if let Some(tx) = sink {
            let _ = tx
                .send(AgentStreamEvent::ToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: arguments.clone(),
                })
                .await;
        }

        let started = Instant::now();
        let mut result = self.tools.call_function(&call.name, arguments.clone()).await;
        if result.duration_ms == 0 {
            result.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        }
        let message = result.to_message();
        info!(
            tool = %tool_name,
            action = %action_name,
            status = %result.status,
            duration_ms = result.duration_ms,
            "Tool call finished"
        );

        response.steps.push(AgentStep::ToolCall {
            tool_name: tool_name.clone(),
            tool_action: action_name.clone(),
            tool_args: arguments,
            tool_result: message.clone(),
            status: result.status,
        });

        self.emit(AgentEvent::ToolResult {
            tool_name: tool_name.clone(),
            action_name: action_name.clone(),
            status: result.status,
            output: result.output.chars().take(EVENT_OUTPUT_CHARS).collect(),
            error: result.error.clone(),
            duration_ms: result.duration_ms,
            session_id: session_id.clone(),
        })
        .await;
        if let Some(tx) = sink {
            let _ = tx
                .send(AgentStreamEvent::ToolResult {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    output: message.clone(),
                    success: result.is_success(),
                })
                .await;
        }

        if let Some(file) = detect_generated_file(&tool_name, &action_name, &result) {
            info!(path = %file.path, size = file.size, "Tool generated a file");
            self.emit(AgentEvent::FileGenerated {
                file_path: file.path,
                file_name: file.name,
                source_tool: tool_name,
                source_action: action_name,
                file_size: file.size,
                session_id,
            })
            .await;
        }

        self.sessions.add_tool_message(&call.id, &message).await;
        result
    }

    async fn model_failed(
        &self,
        model: &ModelConfig,
        failure: ModelFailure,
        mut response: AgentResponse,
        sink: Option<&StreamSink>,
    ) -> AgentResponse {
        let message = failure.describe();
        error!(
            model_key = %model.key,
            session_id = %response.session_id,
            error = %message,
            "Model call failed"
        );
        self.emit(AgentEvent::ModelError {
            source: "model".into(),
            message,
            error_type: failure.error_type().into(),
            session_id: response.session_id.clone(),
        })
        .await;

        response.content = failure.user_message(sink.is_some());
        response.outcome = TurnOutcome::Failed;
        say(sink, &response.content).await;
        response
    }

    async fn abort_on_failures(
        &mut self,
        failures: usize,
        mut response: AgentResponse,
        sink: Option<&StreamSink>,
    ) -> AgentResponse {
        warn!(
            session_id = %response.session_id,
            failures,
            "Consecutive tool failures, stopping the turn"
        );
        response.content = format!(
            "Sorry, {failures} consecutive tool calls failed; stopping the task.\n\
             Please check that the related services are running."
        );
        response.outcome = TurnOutcome::ToolFailures;
        self.sessions
            .add_assistant_message(&response.content, Vec::new())
            .await;
        self.emit(AgentEvent::AgentError {
            source: "agent".into(),
            message: format!("{failures} consecutive tool call failures"),
            session_id: response.session_id.clone(),
        })
        .await;
        say(sink, &response.content).await;
        response
    }

    async fn emit(&self, event: AgentEvent) {
        self.event_bus.publish(event).await;
    }
}

/// Send closing text to the stream, if there is one.
async fn say(sink: Option<&StreamSink>, text: &str) {
    if let Some(tx) = sink {
        let _ = tx
            .send(AgentStreamEvent::Chunk {
                content: text.to_string(),
            })
            .await;
    }
}
