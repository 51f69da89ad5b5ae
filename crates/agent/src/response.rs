//! What one `chat` / `chat_stream` call returns.

use serde::{Deserialize, Serialize};
use steward_core::tool::ToolStatus;

/// How the turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The model answered without tool calls
    Responded,
    /// `max_steps` ran out before a final answer
    StepLimitReached,
    /// Tool failures hit the consecutive-failure limit
    ToolFailures,
    /// The model call errored or timed out
    Failed,
}

/// One entry of the per-turn trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step_type", rename_all = "snake_case")]
pub enum AgentStep {
    ToolCall {
        tool_name: String,
        tool_action: String,
        tool_args: serde_json::Value,
        tool_result: String,
        status: ToolStatus,
    },
    Response {
        content: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Final text shown to the user
    pub content: String,
    pub outcome: TurnOutcome,
    pub steps: Vec<AgentStep>,
    /// Model calls made
    pub total_steps: usize,
    pub total_tokens: u64,
    pub tool_calls_count: usize,
    pub session_id: String,
}

impl AgentResponse {
    pub(crate) fn new(session_id: &str) -> Self {
        Self {
            content: String::new(),
            outcome: TurnOutcome::Failed,
            steps: Vec::new(),
            total_steps: 0,
            total_tokens: 0,
            tool_calls_count: 0,
            session_id: session_id.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == TurnOutcome::Responded
    }
}
