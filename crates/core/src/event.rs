//! Domain events emitted while the agent runs.
//!
//! Every payload is a typed variant; the bus routes on [`AgentEvent::event_type`].

use serde::{Deserialize, Serialize};

use crate::tool::ToolStatus;

/// Subscribes to every event type.
pub const WILDCARD: &str = "*";

/// All events published by the execution core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    UserInput {
        text: String,
        session_id: String,
    },

    AgentThinking {
        step: usize,
        max_steps: usize,
        model_key: String,
        session_id: String,
    },

    ModelCall {
        model_key: String,
        model_id: String,
        message_count: usize,
        has_tools: bool,
        session_id: String,
    },

    ModelResponse {
        model_key: String,
        has_tool_calls: bool,
        content_preview: String,
        session_id: String,
    },

    ModelUsage {
        model_key: String,
        prompt_tokens: u32,
        completion_tokens: u32,
        total_tokens: u32,
        cost: f64,
        session_id: String,
    },

    ModelError {
        source: String,
        message: String,
        error_type: String,
        session_id: String,
    },

    /// Streamed reasoning. Deltas arrive with `is_delta`, the full trace
    /// once at the end with `is_complete`.
    ModelReasoning {
        reasoning: String,
        is_delta: bool,
        is_complete: bool,
        session_id: String,
    },

    ToolCall {
        tool_name: String,
        action_name: String,
        arguments: serde_json::Value,
        function_name: String,
        session_id: String,
    },

    ToolResult {
        tool_name: String,
        action_name: String,
        status: ToolStatus,
        output: String,
        error: Option<String>,
        duration_ms: u64,
        session_id: String,
    },

    AgentResponse {
        content: String,
        total_steps: usize,
        total_tokens: u64,
        tool_calls_count: usize,
        session_id: String,
    },

    AgentError {
        source: String,
        message: String,
        session_id: String,
    },

    FileGenerated {
        file_path: String,
        file_name: String,
        source_tool: String,
        source_action: String,
        file_size: u64,
        session_id: String,
    },

    SessionCreated {
        session_id: String,
        title: String,
    },

    SessionSwitched {
        session_id: String,
    },

    SessionCleared {
        session_id: String,
    },

    /// Published by the model registry before each backoff sleep.
    NetworkRetry {
        model_key: String,
        attempt: u32,
        max_attempts: u32,
        delay_secs: u64,
        error: String,
    },
}

impl AgentEvent {
    /// Routing key used by the event bus.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::UserInput { .. } => "user_input",
            Self::AgentThinking { .. } => "agent_thinking",
            Self::ModelCall { .. } => "model_call",
            Self::ModelResponse { .. } => "model_response",
            Self::ModelUsage { .. } => "model_usage",
            Self::ModelError { .. } => "model_error",
            Self::ModelReasoning { .. } => "model_reasoning",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::AgentResponse { .. } => "agent_response",
            Self::AgentError { .. } => "agent_error",
            Self::FileGenerated { .. } => "file_generated",
            Self::SessionCreated { .. } => "session_created",
            Self::SessionSwitched { .. } => "session_switched",
            Self::SessionCleared { .. } => "session_cleared",
            Self::NetworkRetry { .. } => "network_retry",
        }
    }

    /// Session the event belongs to, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::UserInput { session_id, .. }
            | Self::AgentThinking { session_id, .. }
            | Self::ModelCall { session_id, .. }
            | Self::ModelResponse { session_id, .. }
            | Self::ModelUsage { session_id, .. }
            | Self::ModelError { session_id, .. }
            | Self::ModelReasoning { session_id, .. }
            | Self::ToolCall { session_id, .. }
            | Self::ToolResult { session_id, .. }
            | Self::AgentResponse { session_id, .. }
            | Self::AgentError { session_id, .. }
            | Self::FileGenerated { session_id, .. }
            | Self::SessionCreated { session_id, .. }
            | Self::SessionSwitched { session_id }
            | Self::SessionCleared { session_id } => Some(session_id),
            Self::NetworkRetry { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_tag_matches_event_type() {
        let event = AgentEvent::AgentError {
            source: "agent".into(),
            message: "step limit".into(),
            session_id: "abc12345".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
        assert_eq!(json["source"], "agent");
    }

    #[test]
    fn tool_result_status_is_lowercase() {
        let event = AgentEvent::ToolResult {
            tool_name: "file".into(),
            action_name: "write".into(),
            status: ToolStatus::Denied,
            output: String::new(),
            error: Some("read-only".into()),
            duration_ms: 3,
            session_id: "s".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "denied");
    }

    #[test]
    fn retry_events_have_no_session() {
        let event = AgentEvent::NetworkRetry {
            model_key: "deepseek-chat".into(),
            attempt: 1,
            max_attempts: 3,
            delay_secs: 1,
            error: "reset".into(),
        };
        assert_eq!(event.session_id(), None);
        assert_eq!(event.event_type(), "network_retry");
    }
}
