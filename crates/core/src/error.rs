//! Error types for the Steward domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Steward operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Session errors ---
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    // --- Model selection errors ---
    #[error("Model selection error: {0}")]
    Selection(#[from] SelectionError),

    // --- Storage errors ---
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Unknown model: {0}")]
    ModelNotFound(String),

    #[error("Model '{model_key}' requires the environment variable {env_var}")]
    MissingCredential { model_key: String, env_var: String },

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Inference failed after {attempts} attempt(s): {reason}")]
    InferenceFailure { attempts: u32, reason: String },
}

impl ProviderError {
    /// Network-class failures that may succeed when the call is re-established.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }

    /// Failures caused by local configuration. Never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ModelNotFound(_) | Self::MissingCredential { .. } | Self::NotConfigured(_)
        )
    }

    /// Stable error name carried by `model_error` events.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::ApiError { .. } => "ApiError",
            Self::RateLimited { .. } => "RateLimitError",
            Self::AuthenticationFailed(_) => "AuthenticationError",
            Self::ModelNotFound(_) | Self::MissingCredential { .. } | Self::NotConfigured(_) => {
                "ConfigurationError"
            }
            Self::StreamInterrupted(_) => "StreamInterruptedError",
            Self::Timeout(_) => "TimeoutError",
            Self::Network(_) => "NetworkError",
            Self::InferenceFailure { .. } => "InferenceFailure",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Error)]
pub enum SelectionError {
    #[error("Model '{key}' does not exist. Available models: {available}")]
    UnknownModel { key: String, available: String },

    #[error("No model satisfies the constraints: {constraint}")]
    NoCandidate { constraint: String },

    #[error("No models are registered")]
    EmptyRegistry,
}

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Stored session not found: {0}")]
    NotFound(String),
}

/// Failure reported by an event handler. Logged by the bus, never propagated.
#[derive(Debug, Clone, Error)]
pub enum EventError {
    #[error("Handler failed: {0}")]
    Handler(String),

    #[error("Handler panicked: {0}")]
    Panicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn only_network_class_errors_are_transient() {
        assert!(ProviderError::Network("reset".into()).is_transient());
        assert!(ProviderError::Timeout("slow".into()).is_transient());
        assert!(!ProviderError::ModelNotFound("x".into()).is_transient());
        assert!(!ProviderError::AuthenticationFailed("bad key".into()).is_transient());
        assert!(
            !ProviderError::ApiError {
                status_code: 500,
                message: "boom".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn configuration_errors_are_classified() {
        let err = ProviderError::MissingCredential {
            model_key: "gpt".into(),
            env_var: "OPENAI_API_KEY".into(),
        };
        assert!(err.is_configuration());
        assert_eq!(err.error_type(), "ConfigurationError");
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn timeout_error_type_name() {
        assert_eq!(ProviderError::Timeout("x".into()).error_type(), "TimeoutError");
    }

    #[test]
    fn selection_error_lists_available_models() {
        let err = SelectionError::UnknownModel {
            key: "missing".into(),
            available: "a, b".into(),
        };
        let text = err.to_string();
        assert!(text.contains("missing"));
        assert!(text.contains("a, b"));
    }
}
