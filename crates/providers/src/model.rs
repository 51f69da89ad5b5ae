//! Per-model configuration held by the registry.

use serde::{Deserialize, Serialize};
use steward_config::ModelEntry;
use steward_telemetry::ModelPricing;

const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Everything the registry knows about one model.
#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Registry key (e.g., "deepseek-chat")
    pub key: String,
    /// Provider-side model id
    pub id: String,
    /// Display name
    pub name: String,
    /// Provider id used to route the call
    pub provider: String,
    pub api_type: String,
    #[serde(default)]
    pub base_url: String,
    /// Environment variable holding the credential; empty means none needed
    #[serde(default)]
    pub api_key_env: String,
    /// Inline credential, preferred over `api_key_env`
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    pub input_types: Vec<String>,
    pub supports_function_calling: bool,
    pub context_window: usize,
    pub max_tokens: u32,
    /// USD per million input tokens
    pub cost_input: f64,
    /// USD per million output tokens
    pub cost_output: f64,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ModelConfig {
    /// Build from a `[models.<key>]` entry.
    pub fn from_entry(key: &str, entry: &ModelEntry) -> Self {
        Self {
            key: key.to_string(),
            id: entry.id.clone(),
            name: if entry.name.is_empty() {
                key.to_string()
            } else {
                entry.name.clone()
            },
            provider: entry.provider.clone(),
            api_type: entry.api_type.clone(),
            base_url: entry.base_url.clone(),
            api_key_env: entry.api_key_env.clone(),
            api_key: entry.api_key.clone(),
            input_types: entry.input_types.clone(),
            supports_function_calling: entry.supports_function_calling,
            context_window: entry.context_window,
            max_tokens: entry.max_tokens,
            cost_input: entry.cost_input,
            cost_output: entry.cost_output,
            tags: entry.tags.clone(),
        }
    }

    /// A free local model served by Ollama. `name` may carry a `:tag` suffix.
    pub fn ollama(name: &str) -> Self {
        let base = name.split(':').next().unwrap_or(name);
        Self {
            key: format!("ollama_{base}"),
            id: format!("ollama/{name}"),
            name: format!("{base} (Ollama)"),
            provider: "ollama".into(),
            api_type: "ollama".into(),
            base_url: OLLAMA_BASE_URL.into(),
            api_key_env: String::new(),
            api_key: None,
            input_types: vec!["text".into()],
            supports_function_calling: true,
            context_window: 128_000,
            max_tokens: 8192,
            cost_input: 0.0,
            cost_output: 0.0,
            tags: vec!["local".into(), "ollama".into()],
        }
    }

    pub fn supports_image(&self) -> bool {
        self.input_types.iter().any(|t| t == "image")
    }

    pub fn is_local(&self) -> bool {
        self.provider == "ollama" || self.has_tag("local")
    }

    pub fn is_free(&self) -> bool {
        self.pricing().is_free()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Usable without further setup: local, keyless, or credential present.
    pub fn is_available(&self) -> bool {
        self.is_available_with(&|name| std::env::var(name).ok())
    }

    pub fn is_available_with(&self, lookup: &dyn Fn(&str) -> Option<String>) -> bool {
        if self.is_local() || self.api_key_env.is_empty() || self.api_key.is_some() {
            return true;
        }
        lookup(&self.api_key_env).is_some_and(|v| !v.is_empty())
    }

    pub fn pricing(&self) -> ModelPricing {
        ModelPricing::new(self.cost_input, self.cost_output)
    }

    /// Sum of input and output price, used to rank candidates.
    pub fn combined_cost(&self) -> f64 {
        self.cost_input + self.cost_output
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key_env", &self.api_key_env)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("supports_function_calling", &self.supports_function_calling)
            .field("supports_image", &self.supports_image())
            .field("context_window", &self.context_window)
            .field("max_tokens", &self.max_tokens)
            .field("cost_input", &self.cost_input)
            .field("cost_output", &self.cost_output)
            .field("tags", &self.tags)
            .finish()
    }
}
