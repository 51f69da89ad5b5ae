//! Events pushed to the caller's sink during `Agent::chat_stream`.
//!
//! Bus events ([`AgentEvent`](steward_core::AgentEvent)) describe the whole
//! run for observers; these carry only what a UI renders incrementally.

use serde::{Deserialize, Serialize};

/// Events emitted to the caller during streaming execution.
///
/// - `chunk`      : partial answer text, in arrival order
/// - `tool_call`  : the agent is invoking a tool
/// - `tool_result`: the tool finished
/// - `done`       : the turn is over; always the last event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    /// Partial text from the model, or the final status message.
    Chunk { content: String },

    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    ToolResult {
        id: String,
        name: String,
        output: String,
        success: bool,
    },

    Done {
        session_id: String,
        total_steps: usize,
        total_tokens: u64,
        tool_calls_made: usize,
    },
}

impl AgentStreamEvent {
    /// SSE-style event name.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Done { .. } => "done",
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}
