//! Model registry: per-model configuration, provider routing, retry and
//! usage accounting.
//!
//! The registry resolves a model key to its configuration, credential and
//! provider collaborator, then performs the call. Transient failures are
//! retried only while establishing the call; every successful call yields
//! exactly one [`UsageRecord`].

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use steward_config::AppConfig;
use steward_core::error::ProviderError;
use steward_core::event::AgentEvent;
use steward_core::event_bus::EventBus;
use steward_core::message::Message;
use steward_core::provider::{ChunkReceiver, Provider, ProviderRequest, Usage};
use steward_telemetry::UsageRecord;
use tracing::{debug, info, warn};

use crate::model::ModelConfig;
use crate::retry::RetryPolicy;

/// Looks up a credential by environment variable name.
pub type CredentialSource = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// A completed, accounted model call.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Assistant message, with or without tool calls
    pub message: Message,
    pub reasoning: Option<String>,
    /// Model id reported by the provider
    pub model: String,
    /// The record appended to the usage history for this call
    pub usage: UsageRecord,
}

/// Aggregate view over the usage history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub total_calls: usize,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
}

/// Records kept in the usage history; totals cover every call.
pub const USAGE_HISTORY_LIMIT: usize = 1000;

#[derive(Debug, Default)]
struct UsageLedger {
    recent: VecDeque<UsageRecord>,
    calls: usize,
    tokens: u64,
    cost: f64,
}

pub struct ModelRegistry {
    models: RwLock<Vec<ModelConfig>>,
    providers: RwLock<HashMap<String, Arc<dyn Provider>>>,
    usage: RwLock<UsageLedger>,
    retry: RetryPolicy,
    event_bus: Option<Arc<EventBus>>,
    credentials: CredentialSource,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            models: RwLock::new(Vec::new()),
            providers: RwLock::new(HashMap::new()),
            usage: RwLock::new(UsageLedger::default()),
            retry: RetryPolicy::default(),
            event_bus: None,
            credentials: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    /// Registry holding every `[models]` entry, using the `[retry]` schedule.
    pub fn from_config(config: &AppConfig) -> Self {
        let registry = Self::new().with_retry_policy(RetryPolicy::from_settings(&config.retry));
        for (key, entry) in &config.models {
            registry.register(ModelConfig::from_entry(key, entry));
        }
        info!(models = config.models.len(), "Model registry loaded");
        registry
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Publish `NetworkRetry` events on this bus.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Replace the environment lookup used for `api_key_env`.
    pub fn with_credentials(mut self, source: CredentialSource) -> Self {
        self.credentials = source;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    // ── Registration ──────────────────────────────────────────────────

    /// Add or replace a model by key.
    pub fn register(&self, model: ModelConfig) {
        let mut models = self.models.write().unwrap_or_else(PoisonError::into_inner);
        match models.iter_mut().find(|m| m.key == model.key) {
            Some(existing) => *existing = model,
            None => models.push(model),
        }
    }

    /// Register an Ollama model by name (e.g., "llama3.2:3b").
    pub fn register_local_model(&self, name: &str) -> ModelConfig {
        let model = ModelConfig::ollama(name);
        info!(model_key = %model.key, model_id = %model.id, "Registered local model");
        self.register(model.clone());
        model
    }

    /// Route every model whose `provider` equals `provider_id` to `provider`.
    pub fn register_provider(&self, provider_id: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider_id.into(), provider);
    }

    // ── Queries ───────────────────────────────────────────────────────

    pub fn get(&self, key: &str) -> Option<ModelConfig> {
        self.filter(|m| m.key == key).into_iter().next()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// All models in registration order.
    pub fn list_models(&self) -> Vec<ModelConfig> {
        self.filter(|_| true)
    }

    pub fn keys(&self) -> Vec<String> {
        self.list_models().into_iter().map(|m| m.key).collect()
    }

    pub fn list_available_models(&self) -> Vec<ModelConfig> {
        let lookup = |name: &str| (self.credentials)(name);
        self.filter(|m| m.is_available_with(&lookup))
    }

    pub fn find_by_capability(&self, needs_function_calling: bool, needs_image: bool) -> Vec<ModelConfig> {
        self.filter(|m| {
            (!needs_function_calling || m.supports_function_calling)
                && (!needs_image || m.supports_image())
        })
    }

    pub fn find_by_provider(&self, provider: &str) -> Vec<ModelConfig> {
        self.filter(|m| m.provider == provider)
    }

    pub fn find_by_tag(&self, tag: &str) -> Vec<ModelConfig> {
        self.filter(|m| m.has_tag(tag))
    }

    pub fn find_local_models(&self) -> Vec<ModelConfig> {
        self.filter(ModelConfig::is_local)
    }

    pub fn find_free_models(&self) -> Vec<ModelConfig> {
        self.filter(ModelConfig::is_free)
    }

    fn filter(&self, pred: impl Fn(&ModelConfig) -> bool) -> Vec<ModelConfig> {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|m| pred(m))
            .cloned()
            .collect()
    }

    // ── Inference ─────────────────────────────────────────────────────

    /// Blocking call. Retries transient failures per the retry policy.
    pub async fn chat(
        &self,
        model_key: &str,
        messages: Vec<Message>,
        tools: &[serde_json::Value],
    ) -> Result<ChatResponse, ProviderError> {
        let (model, provider, request) = self.prepare(model_key, messages, tools, false)?;

        let response = self
            .with_retry(model_key, || provider.complete(request.clone()))
            .await?;

        let usage = self.push_usage(&model, response.usage.unwrap_or_default());
        debug!(
            model_key,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            cost = usage.cost,
            "Model call completed"
        );
        Ok(ChatResponse {
            message: response.message,
            reasoning: response.reasoning,
            model: response.model,
            usage,
        })
    }

    /// Streaming call. Only establishing the stream is retried; a failure
    /// after the first chunk arrives on the receiver and is not retried.
    /// Callers report final usage through [`record_stream_usage`](Self::record_stream_usage)
    /// once the stream ends, with `Usage::default()` when none arrived.
    pub async fn chat_stream(
        &self,
        model_key: &str,
        messages: Vec<Message>,
        tools: &[serde_json::Value],
    ) -> Result<ChunkReceiver, ProviderError> {
        let (_model, provider, request) = self.prepare(model_key, messages, tools, true)?;
        self.with_retry(model_key, || provider.stream(request.clone()))
            .await
    }

    /// Account for a finished stream. Returns `None` for an unknown model.
    pub fn record_stream_usage(&self, model_key: &str, usage: Usage) -> Option<UsageRecord> {
        let model = self.get(model_key)?;
        Some(self.push_usage(&model, usage))
    }

    fn prepare(
        &self,
        model_key: &str,
        messages: Vec<Message>,
        tools: &[serde_json::Value],
        stream: bool,
    ) -> Result<(ModelConfig, Arc<dyn Provider>, ProviderRequest), ProviderError> {
        let model = self
            .get(model_key)
            .ok_or_else(|| ProviderError::ModelNotFound(model_key.to_string()))?;

        let api_key = match (&model.api_key, model.api_key_env.as_str()) {
            (Some(key), _) => Some(key.clone()),
            (None, "") => None,
            (None, env_var) => Some(
                (self.credentials)(env_var)
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| ProviderError::MissingCredential {
                        model_key: model_key.to_string(),
                        env_var: env_var.to_string(),
                    })?,
            ),
        };

        let provider = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&model.provider)
            .cloned()
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "no provider registered for '{}' (model '{}')",
                    model.provider, model_key
                ))
            })?;

        let tools = if model.supports_function_calling {
            tools.to_vec()
        } else {
            Vec::new()
        };

        let request = ProviderRequest {
            model: model.id.clone(),
            messages,
            max_tokens: Some(model.max_tokens),
            tools,
            base_url: (!model.base_url.is_empty()).then(|| model.base_url.clone()),
            api_key,
            stream,
        };
        Ok((model, provider, request))
    }

    async fn with_retry<T, F, Fut>(&self, model_key: &str, mut call: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt: u32 = 1;
        loop {
            debug!(model_key, attempt, "Calling model");
            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(e),
            };

            let Some(delay) = self.retry.delay_after(attempt) else {
                return Err(ProviderError::InferenceFailure {
                    attempts: attempt,
                    reason: err.to_string(),
                });
            };

            warn!(
                model_key,
                attempt,
                max_attempts = self.retry.max_attempts,
                delay_secs = delay.as_secs(),
                error = %err,
                "Transient model error, retrying"
            );
            if let Some(bus) = &self.event_bus {
                bus.publish(AgentEvent::NetworkRetry {
                    model_key: model_key.to_string(),
                    attempt,
                    max_attempts: self.retry.max_attempts,
                    delay_secs: delay.as_secs(),
                    error: err.to_string(),
                })
                .await;
            }
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    // ── Usage ─────────────────────────────────────────────────────────

    fn push_usage(&self, model: &ModelConfig, usage: Usage) -> UsageRecord {
        let record = UsageRecord::priced(
            &model.key,
            usage.prompt_tokens,
            usage.completion_tokens,
            usage.total_tokens,
            &model.pricing(),
        );
        let mut ledger = self.usage.write().unwrap_or_else(PoisonError::into_inner);
        if ledger.recent.len() >= USAGE_HISTORY_LIMIT {
            ledger.recent.pop_front();
        }
        ledger.recent.push_back(record.clone());
        ledger.calls += 1;
        ledger.tokens += u64::from(record.total_tokens);
        ledger.cost += record.cost;
        record
    }

    /// The most recent records, oldest first.
    pub fn usage_history(&self) -> Vec<UsageRecord> {
        self.usage
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .recent
            .iter()
            .cloned()
            .collect()
    }

    pub fn total_cost(&self) -> f64 {
        self.usage.read().unwrap_or_else(PoisonError::into_inner).cost
    }

    pub fn total_tokens(&self) -> u64 {
        self.usage.read().unwrap_or_else(PoisonError::into_inner).tokens
    }

    pub fn usage_summary(&self) -> UsageSummary {
        let ledger = self.usage.read().unwrap_or_else(PoisonError::into_inner);
        UsageSummary {
            total_calls: ledger.calls,
            total_tokens: ledger.tokens,
            total_cost_usd: ledger.cost,
        }
    }

    pub fn clear_usage(&self) {
        *self.usage.write().unwrap_or_else(PoisonError::into_inner) = UsageLedger::default();
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
