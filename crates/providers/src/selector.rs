//! Model selection over the registry.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use steward_core::error::SelectionError;
use tracing::{debug, info};

use crate::model::ModelConfig;
use crate::registry::ModelRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Exact key lookup; an empty key means the default model.
    Specified,
    /// Filter by capability, then pick the cheapest survivor.
    Capability,
    /// Cheapest model overall.
    CostFirst,
}

/// Constraints for [`SelectionStrategy::Capability`]. Zero numeric fields
/// mean unlimited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionCriteria {
    pub needs_function_calling: bool,
    pub needs_image: bool,
    pub preferred_provider: Option<String>,
    pub preferred_tag: Option<String>,
    pub exclude_local: bool,
    /// Ceiling on input price, USD per million tokens
    pub max_cost_input: f64,
    pub min_context_window: usize,
}

impl SelectionCriteria {
    pub fn for_task(needs_function_calling: bool, needs_image: bool) -> Self {
        Self {
            needs_function_calling,
            needs_image,
            ..Default::default()
        }
    }

    pub fn with_preferred_provider(mut self, provider: impl Into<String>) -> Self {
        self.preferred_provider = Some(provider.into());
        self
    }

    pub fn with_preferred_tag(mut self, tag: impl Into<String>) -> Self {
        self.preferred_tag = Some(tag.into());
        self
    }

    pub fn excluding_local(mut self) -> Self {
        self.exclude_local = true;
        self
    }

    fn admits(&self, model: &ModelConfig) -> bool {
        (!self.needs_function_calling || model.supports_function_calling)
            && (!self.needs_image || model.supports_image())
            && (!self.exclude_local || !model.is_local())
            && (self.max_cost_input <= 0.0 || model.cost_input <= self.max_cost_input)
            && (self.min_context_window == 0 || model.context_window >= self.min_context_window)
    }

    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.needs_function_calling {
            parts.push("function calling".to_string());
        }
        if self.needs_image {
            parts.push("image input".to_string());
        }
        if self.exclude_local {
            parts.push("non-local".to_string());
        }
        if self.max_cost_input > 0.0 {
            parts.push(format!("input cost <= ${}/M", self.max_cost_input));
        }
        if self.min_context_window > 0 {
            parts.push(format!("context window >= {}", self.min_context_window));
        }
        if parts.is_empty() {
            "any model".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Picks a [`ModelConfig`] from the registry.
pub struct ModelSelector {
    registry: Arc<ModelRegistry>,
    default_model: RwLock<String>,
}

impl ModelSelector {
    pub fn new(registry: Arc<ModelRegistry>, default_model: impl Into<String>) -> Self {
        Self {
            registry,
            default_model: RwLock::new(default_model.into()),
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn default_model(&self) -> String {
        self.default_model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_default_model(&self, key: &str) -> Result<(), SelectionError> {
        if !self.registry.contains(key) {
            return Err(self.unknown(key));
        }
        *self
            .default_model
            .write()
            .unwrap_or_else(PoisonError::into_inner) = key.to_string();
        info!(model_key = key, "Default model changed");
        Ok(())
    }

    pub fn select(
        &self,
        strategy: SelectionStrategy,
        model_key: Option<&str>,
        criteria: &SelectionCriteria,
    ) -> Result<ModelConfig, SelectionError> {
        match strategy {
            SelectionStrategy::Specified => self.select_specified(model_key.unwrap_or_default()),
            SelectionStrategy::Capability => self.select_by_capability(criteria),
            SelectionStrategy::CostFirst => self.select_cost_first(criteria.exclude_local),
        }
    }

    /// Explicit key, else the default model when it can do the task, else
    /// the cheapest capable model.
    pub fn select_for_task(
        &self,
        needs_function_calling: bool,
        needs_image: bool,
        model_key: Option<&str>,
    ) -> Result<ModelConfig, SelectionError> {
        if let Some(key) = model_key.filter(|k| !k.is_empty()) {
            return self.select_specified(key);
        }

        let criteria = SelectionCriteria::for_task(needs_function_calling, needs_image);
        if let Some(default) = self.registry.get(&self.default_model())
            && criteria.admits(&default)
        {
            debug!(model_key = %default.key, "Default model fits the task");
            return Ok(default);
        }

        self.select_by_capability(&criteria)
    }

    fn select_specified(&self, key: &str) -> Result<ModelConfig, SelectionError> {
        let key = if key.is_empty() {
            self.default_model()
        } else {
            key.to_string()
        };
        self.registry.get(&key).ok_or_else(|| self.unknown(&key))
    }

    fn select_by_capability(&self, criteria: &SelectionCriteria) -> Result<ModelConfig, SelectionError> {
        let mut candidates: Vec<ModelConfig> = self
            .registry
            .list_models()
            .into_iter()
            .filter(|m| criteria.admits(m))
            .collect();

        // price first; provider then tag preference only breaks ties
        let misses = |m: &ModelConfig| {
            let provider = criteria
                .preferred_provider
                .as_ref()
                .is_some_and(|p| &m.provider != p);
            let tag = criteria.preferred_tag.as_ref().is_some_and(|t| !m.has_tag(t));
            (provider, tag)
        };
        candidates.sort_by(|a, b| {
            a.combined_cost()
                .total_cmp(&b.combined_cost())
                .then_with(|| misses(a).cmp(&misses(b)))
        });

        let chosen = candidates
            .into_iter()
            .next()
            .ok_or_else(|| SelectionError::NoCandidate {
                constraint: criteria.describe(),
            })?;
        info!(
            model_key = %chosen.key,
            cost_input = chosen.cost_input,
            cost_output = chosen.cost_output,
            "Selected model by capability"
        );
        Ok(chosen)
    }

    fn select_cost_first(&self, exclude_local: bool) -> Result<ModelConfig, SelectionError> {
        let models = self.registry.list_models();
        if models.is_empty() {
            return Err(SelectionError::EmptyRegistry);
        }
        let candidates = models
            .into_iter()
            .filter(|m| !exclude_local || !m.is_local())
            .collect();
        cheapest(candidates).ok_or_else(|| SelectionError::NoCandidate {
            constraint: "no models left after excluding local models".into(),
        })
    }

    fn unknown(&self, key: &str) -> SelectionError {
        SelectionError::UnknownModel {
            key: key.to_string(),
            available: self.registry.keys().join(", "),
        }
    }
}

/// Cheapest by combined price; ties keep registration order.
fn cheapest(mut candidates: Vec<ModelConfig>) -> Option<ModelConfig> {
    candidates.sort_by(|a, b| a.combined_cost().total_cmp(&b.combined_cost()));
    candidates.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(key: &str, provider: &str, cost_in: f64, cost_out: f64) -> ModelConfig {
        let mut m = ModelConfig::ollama(key);
        m.key = key.into();
        m.provider = provider.into();
        m.tags.clear();
        m.cost_input = cost_in;
        m.cost_output = cost_out;
        m
    }

    fn selector() -> ModelSelector {
        let registry = ModelRegistry::new();
        let mut vision = model("vision", "openai", 2.5, 10.0);
        vision.input_types.push("image".into());
        registry.register(vision);
        let mut reasoner = model("reasoner", "deepseek", 0.55, 2.19);
        reasoner.supports_function_calling = false;
        registry.register(reasoner);
        let mut chat = model("chat", "deepseek", 0.27, 1.10);
        chat.context_window = 64_000;
        chat.tags.push("cheap".into());
        registry.register(chat);
        registry.register(model("mini", "openai", 0.15, 0.60));
        registry.register_local_model("llama3.2:3b");
        ModelSelector::new(Arc::new(registry), "chat")
    }

    #[test]
    fn specified_and_default() {
        let s = selector();
        let none = SelectionCriteria::default();
        assert_eq!(s.select(SelectionStrategy::Specified, Some("vision"), &none).unwrap().key, "vision");
        assert_eq!(s.select(SelectionStrategy::Specified, Some(""), &none).unwrap().key, "chat");
        assert_eq!(s.select(SelectionStrategy::Specified, None, &none).unwrap().key, "chat");

        let err = s.select(SelectionStrategy::Specified, Some("ghost"), &none).unwrap_err();
        match err {
            SelectionError::UnknownModel { key, available } => {
                assert_eq!(key, "ghost");
                assert!(available.contains("vision, reasoner, chat"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn capability_picks_cheapest_capable() {
        let s = selector();
        let pick = |c: SelectionCriteria| s.select(SelectionStrategy::Capability, None, &c).unwrap().key;

        assert_eq!(pick(SelectionCriteria::for_task(true, false)), "ollama_llama3.2");
        assert_eq!(pick(SelectionCriteria::for_task(true, false).excluding_local()), "mini");
        assert_eq!(pick(SelectionCriteria::for_task(false, true)), "vision");
        // a preference never beats a lower price
        assert_eq!(
            pick(SelectionCriteria::for_task(true, false).with_preferred_provider("deepseek")),
            "ollama_llama3.2"
        );
        assert_eq!(
            pick(SelectionCriteria::for_task(false, false).excluding_local().with_preferred_tag("cheap")),
            "mini"
        );

        let bounded = SelectionCriteria {
            min_context_window: 100_000,
            max_cost_input: 1.0,
            exclude_local: true,
            ..Default::default()
        };
        assert_eq!(pick(bounded), "mini");
    }

    #[test]
    fn preference_breaks_price_ties() {
        let registry = ModelRegistry::new();
        registry.register(model("first", "openai", 0.5, 1.0));
        let mut tagged = model("tagged", "openai", 0.5, 1.0);
        tagged.tags.push("fast".into());
        registry.register(tagged);
        registry.register(model("second", "deepseek", 0.5, 1.0));
        registry.register(model("pricey", "deepseek", 3.0, 6.0));
        let s = ModelSelector::new(Arc::new(registry), "first");
        let pick = |c: SelectionCriteria| s.select(SelectionStrategy::Capability, None, &c).unwrap().key;

        // ties without a preference keep registration order
        assert_eq!(pick(SelectionCriteria::default()), "first");
        assert_eq!(pick(SelectionCriteria::default().with_preferred_provider("deepseek")), "second");
        assert_eq!(pick(SelectionCriteria::default().with_preferred_tag("fast")), "tagged");
        // provider outranks tag among equally priced models
        assert_eq!(
            pick(
                SelectionCriteria::default()
                    .with_preferred_provider("deepseek")
                    .with_preferred_tag("fast")
            ),
            "second"
        );
    }

    #[test]
    fn preference_without_match_is_ignored() {
        let s = selector();
        let c = SelectionCriteria::for_task(true, false)
            .excluding_local()
            .with_preferred_provider("anthropic");
        assert_eq!(s.select(SelectionStrategy::Capability, None, &c).unwrap().key, "mini");
    }

    #[test]
    fn capability_error_names_constraint() {
        let s = selector();
        let c = SelectionCriteria {
            needs_function_calling: true,
            needs_image: true,
            max_cost_input: 1.0,
            ..Default::default()
        };
        let err = s.select(SelectionStrategy::Capability, None, &c).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("function calling"));
        assert!(text.contains("image input"));
    }

    #[test]
    fn cost_first() {
        let s = selector();
        let c = SelectionCriteria::default();
        assert_eq!(s.select(SelectionStrategy::CostFirst, None, &c).unwrap().key, "ollama_llama3.2");
        let c = c.excluding_local();
        assert_eq!(s.select(SelectionStrategy::CostFirst, None, &c).unwrap().key, "mini");

        let empty = ModelSelector::new(Arc::new(ModelRegistry::new()), "x");
        assert!(matches!(
            empty.select(SelectionStrategy::CostFirst, None, &SelectionCriteria::default()),
            Err(SelectionError::EmptyRegistry)
        ));

        let local_only = ModelRegistry::new();
        local_only.register_local_model("qwen2.5");
        let s = ModelSelector::new(Arc::new(local_only), "x");
        let err = s
            .select(SelectionStrategy::CostFirst, None, &SelectionCriteria::default().excluding_local())
            .unwrap_err();
        assert!(err.to_string().contains("excluding local"));
    }

    #[test]
    fn select_for_task_order() {
        let s = selector();
        assert_eq!(s.select_for_task(true, false, Some("vision")).unwrap().key, "vision");
        assert_eq!(s.select_for_task(true, false, None).unwrap().key, "chat");
        // default cannot see images
        assert_eq!(s.select_for_task(false, true, None).unwrap().key, "vision");

        s.set_default_model("reasoner").unwrap();
        assert_eq!(s.select_for_task(false, false, Some("")).unwrap().key, "reasoner");
        assert_eq!(s.select_for_task(true, false, None).unwrap().key, "ollama_llama3.2");
    }

    #[test]
    fn set_default_rejects_unknown() {
        let s = selector();
        assert!(s.set_default_model("ghost").is_err());
        assert_eq!(s.default_model(), "chat");
    }
}
