//! Configuration loading, validation, and management for Steward.
//!
//! Loads configuration from `~/.steward/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.steward/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model used when a request names none
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Agent loop bounds and timeouts
    #[serde(default)]
    pub agent: AgentSettings,

    /// Session history and truncation thresholds
    #[serde(default)]
    pub session: SessionSettings,

    /// Retry schedule for establishing model calls
    #[serde(default)]
    pub retry: RetrySettings,

    /// Daily spending ceiling
    #[serde(default)]
    pub budget: BudgetSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    /// Model catalogue, keyed by model key
    #[serde(default = "default_models")]
    pub models: BTreeMap<String, ModelEntry>,
}

fn default_model() -> String {
    "deepseek-chat".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Bound on one whole model call, in seconds
    #[serde(default = "default_inference_timeout")]
    pub inference_timeout_secs: u64,

    /// Bound on the gap between two streamed chunks, in seconds
    #[serde(default = "default_stream_chunk_timeout")]
    pub stream_chunk_timeout_secs: u64,

    /// Chunk gap bound for local models, which load lazily
    #[serde(default = "default_local_stream_chunk_timeout")]
    pub local_stream_chunk_timeout_secs: u64,

    #[serde(default = "default_max_tools_per_call")]
    pub max_tools_per_call: usize,

    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: usize,

    /// Restate the task every N steps (0 disables)
    #[serde(default = "default_anchor_interval")]
    pub anchor_interval: usize,
}

fn default_max_steps() -> usize {
    60
}
fn default_inference_timeout() -> u64 {
    120
}
fn default_stream_chunk_timeout() -> u64 {
    60
}
fn default_local_stream_chunk_timeout() -> u64 {
    300
}
fn default_max_tools_per_call() -> usize {
    3
}
fn default_max_consecutive_failures() -> usize {
    3
}
fn default_anchor_interval() -> usize {
    3
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            inference_timeout_secs: default_inference_timeout(),
            stream_chunk_timeout_secs: default_stream_chunk_timeout(),
            local_stream_chunk_timeout_secs: default_local_stream_chunk_timeout(),
            max_tools_per_call: default_max_tools_per_call(),
            max_consecutive_failures: default_max_consecutive_failures(),
            anchor_interval: default_anchor_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Token ceiling used when the caller gives none
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Hard cap on stored messages per session
    #[serde(default = "default_max_message_count")]
    pub max_message_count: usize,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_context_window() -> usize {
    64_000
}
fn default_max_sessions() -> usize {
    50
}
fn default_max_message_count() -> usize {
    100
}
fn default_system_prompt() -> String {
    "You are a capable assistant. Use the available tools when they help, \
     and answer directly when they do not."
        .into()
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            context_window: default_context_window(),
            max_sessions: default_max_sessions(),
            max_message_count: default_max_message_count(),
            system_prompt: default_system_prompt(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before attempt 2, 3, ... The last entry repeats.
    #[serde(default = "default_delays")]
    pub delays_secs: Vec<u64>,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_delays() -> Vec<u64> {
    vec![1, 2, 4]
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delays_secs: default_delays(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetSettings {
    /// USD per day, 0.0 = unlimited
    #[serde(default)]
    pub daily_limit_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// One `[models.<key>]` table.
#[derive(Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Provider-side model id
    pub id: String,

    /// Display name (defaults to the key)
    #[serde(default)]
    pub name: String,

    /// Provider id: openai / anthropic / deepseek / google / ollama / ...
    pub provider: String,

    pub api_type: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub base_url: String,

    /// Name of the environment variable holding the credential
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key_env: String,

    /// Inline credential. Takes precedence over `api_key_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_input_types")]
    pub input_types: Vec<String>,

    #[serde(default = "default_true")]
    pub supports_function_calling: bool,

    #[serde(default = "default_model_context_window")]
    pub context_window: usize,

    #[serde(default = "default_model_max_tokens")]
    pub max_tokens: u32,

    /// USD per million input tokens
    #[serde(default)]
    pub cost_input: f64,

    /// USD per million output tokens
    #[serde(default)]
    pub cost_output: f64,

    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_input_types() -> Vec<String> {
    vec!["text".into()]
}
fn default_true() -> bool {
    true
}
fn default_model_context_window() -> usize {
    128_000
}
fn default_model_max_tokens() -> u32 {
    8192
}

impl std::fmt::Debug for ModelEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("provider", &self.provider)
            .field("api_type", &self.api_type)
            .field("base_url", &self.base_url)
            .field("api_key_env", &self.api_key_env)
            .field("api_key", &redact(&self.api_key))
            .field("input_types", &self.input_types)
            .field("supports_function_calling", &self.supports_function_calling)
            .field("context_window", &self.context_window)
            .field("max_tokens", &self.max_tokens)
            .field("cost_input", &self.cost_input)
            .field("cost_output", &self.cost_output)
            .field("tags", &self.tags)
            .finish()
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[allow(clippy::too_many_arguments)]
fn entry(
    id: &str,
    name: &str,
    provider: &str,
    base_url: &str,
    api_key_env: &str,
    context_window: usize,
    cost: (f64, f64),
    tags: &[&str],
) -> ModelEntry {
    ModelEntry {
        id: id.into(),
        name: name.into(),
        provider: provider.into(),
        api_type: "openai".into(),
        base_url: base_url.into(),
        api_key_env: api_key_env.into(),
        api_key: None,
        input_types: default_input_types(),
        supports_function_calling: true,
        context_window,
        max_tokens: default_model_max_tokens(),
        cost_input: cost.0,
        cost_output: cost.1,
        tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

/// Built-in catalogue used when the file has no `[models]` section.
fn default_models() -> BTreeMap<String, ModelEntry> {
    let mut models = BTreeMap::new();
    models.insert(
        "deepseek-chat".into(),
        entry(
            "deepseek/deepseek-chat",
            "DeepSeek Chat",
            "deepseek",
            "https://api.deepseek.com",
            "DEEPSEEK_API_KEY",
            64_000,
            (0.27, 1.10),
            &["cheap", "default"],
        ),
    );
    let mut reasoner = entry(
        "deepseek/deepseek-reasoner",
        "DeepSeek Reasoner",
        "deepseek",
        "https://api.deepseek.com",
        "DEEPSEEK_API_KEY",
        64_000,
        (0.55, 2.19),
        &["reasoning"],
    );
    reasoner.supports_function_calling = false;
    models.insert("deepseek-reasoner".into(), reasoner);

    let mut gpt = entry(
        "gpt-4o",
        "GPT-4o",
        "openai",
        "",
        "OPENAI_API_KEY",
        128_000,
        (2.50, 10.00),
        &["vision"],
    );
    gpt.input_types = vec!["text".into(), "image".into()];
    models.insert("gpt-4o".into(), gpt);
    models
}

impl AppConfig {
    /// Load configuration from the default path (~/.steward/config.toml),
    /// then apply environment overrides:
    /// - `STEWARD_MODEL`
    /// - `STEWARD_MAX_STEPS`
    /// - `STEWARD_INFERENCE_TIMEOUT`
    /// - `STEWARD_DAILY_BUDGET`
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("STEWARD_MODEL") {
            self.default_model = model;
        }
        if let Some(raw) = lookup("STEWARD_MAX_STEPS") {
            self.agent.max_steps = parse_override("STEWARD_MAX_STEPS", &raw)?;
        }
        if let Some(raw) = lookup("STEWARD_INFERENCE_TIMEOUT") {
            self.agent.inference_timeout_secs = parse_override("STEWARD_INFERENCE_TIMEOUT", &raw)?;
        }
        if let Some(raw) = lookup("STEWARD_DAILY_BUDGET") {
            self.budget.daily_limit_usd = parse_override("STEWARD_DAILY_BUDGET", &raw)?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".steward")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: String| Err(ConfigError::ValidationError(msg));

        if self.agent.max_steps == 0 {
            return fail("agent.max_steps must be > 0".into());
        }
        if self.agent.inference_timeout_secs == 0
            || self.agent.stream_chunk_timeout_secs == 0
            || self.agent.local_stream_chunk_timeout_secs == 0
        {
            return fail("agent timeouts must be > 0".into());
        }
        if self.session.context_window == 0 {
            return fail("session.context_window must be > 0".into());
        }
        if self.session.max_message_count < 2 {
            return fail("session.max_message_count must be at least 2".into());
        }
        if self.session.max_sessions == 0 {
            return fail("session.max_sessions must be > 0".into());
        }
        if self.retry.max_attempts == 0 {
            return fail("retry.max_attempts must be > 0".into());
        }
        if self.retry.max_attempts > 1 && self.retry.delays_secs.is_empty() {
            return fail("retry.delays_secs must not be empty when retries are enabled".into());
        }
        if self.budget.daily_limit_usd < 0.0 {
            return fail("budget.daily_limit_usd must be >= 0".into());
        }

        for (key, model) in &self.models {
            if model.id.trim().is_empty() {
                return fail(format!("models.{key}.id must not be empty"));
            }
            if model.provider.trim().is_empty() {
                return fail(format!("models.{key}.provider must not be empty"));
            }
            if model.cost_input < 0.0 || model.cost_output < 0.0 {
                return fail(format!("models.{key} prices must be >= 0"));
            }
        }

        if !self.models.is_empty() && !self.models.contains_key(&self.default_model) {
            return fail(format!(
                "default_model '{}' is not defined under [models]",
                self.default_model
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            agent: AgentSettings::default(),
            session: SessionSettings::default(),
            retry: RetrySettings::default(),
            budget: BudgetSettings::default(),
            logging: LoggingSettings::default(),
            models: default_models(),
        }
    }
}

fn parse_override<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{name} has an invalid value: {raw}")))
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
