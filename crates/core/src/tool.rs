//! Tool collaborator seam.
//!
//! The agent never executes capabilities itself. It asks a [`ToolExecutor`]
//! for function schemas, resolves a model-facing function name to a
//! `(tool, action)` pair, and receives a [`ToolResult`] per call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;

/// Outcome class of one tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
    Timeout,
    Denied,
    Cancelled,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Timeout => "timeout",
            Self::Denied => "denied",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub status: ToolStatus,

    /// Human-readable output fed back to the model
    #[serde(default)]
    pub output: String,

    /// Optional structured data (e.g. `{"path": "..."}` for written files)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default)]
    pub duration_ms: u64,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Success,
            output: output.into(),
            data: None,
            error: None,
            duration_ms: 0,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::failed(ToolStatus::Error, error)
    }

    pub fn timeout(error: impl Into<String>) -> Self {
        Self::failed(ToolStatus::Timeout, error)
    }

    pub fn denied(error: impl Into<String>) -> Self {
        Self::failed(ToolStatus::Denied, error)
    }

    pub fn cancelled() -> Self {
        Self::failed(ToolStatus::Cancelled, "cancelled")
    }

    fn failed(status: ToolStatus, error: impl Into<String>) -> Self {
        Self {
            status,
            output: String::new(),
            data: None,
            error: Some(error.into()),
            duration_ms: 0,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    /// Text appended to the conversation as the `tool` message.
    pub fn to_message(&self) -> String {
        let error = self.error.as_deref().unwrap_or_default();
        match self.status {
            ToolStatus::Success if self.output.is_empty() => "(no output)".to_string(),
            ToolStatus::Success => self.output.clone(),
            ToolStatus::Timeout => format!("[timeout] {error}"),
            ToolStatus::Denied => format!("[denied] {error}"),
            ToolStatus::Cancelled => "[cancelled]".to_string(),
            ToolStatus::Error => format!("[error] {error}"),
        }
    }
}

impl From<ToolError> for ToolResult {
    fn from(err: ToolError) -> Self {
        match &err {
            ToolError::Timeout { .. } => Self::timeout(err.to_string()),
            ToolError::PermissionDenied { .. } => Self::denied(err.to_string()),
            _ => Self::error(err.to_string()),
        }
    }
}

/// External tool registry consumed by the agent.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Function schemas in the OpenAI `{"type": "function", ...}` shape.
    fn all_schemas(&self) -> Vec<serde_json::Value>;

    /// Map a model-facing function name to `(tool_name, action_name)`.
    fn resolve_function_name(&self, function_name: &str) -> Option<(String, String)>;

    /// Execute one call. Failures are reported in the result, never raised.
    async fn call_function(&self, function_name: &str, arguments: serde_json::Value) -> ToolResult;
}

/// Executor with no tools. Models are called without schemas.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTools;

#[async_trait]
impl ToolExecutor for NoTools {
    fn all_schemas(&self) -> Vec<serde_json::Value> {
        Vec::new()
    }

    fn resolve_function_name(&self, _function_name: &str) -> Option<(String, String)> {
        None
    }

    async fn call_function(&self, function_name: &str, _arguments: serde_json::Value) -> ToolResult {
        ToolError::NotFound(function_name.to_string()).into()
    }
}
