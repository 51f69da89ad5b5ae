//! Per-model pricing.
//!
//! Prices are in USD per 1 million tokens. Each model has an input and
//! output price, taken from its `[models.<key>]` entry.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Price per 1M input tokens in USD.
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD.
    pub output_per_m: f64,
}

impl ModelPricing {
    pub fn new(input_per_m: f64, output_per_m: f64) -> Self {
        Self {
            input_per_m,
            output_per_m,
        }
    }

    /// Compute cost for the given token counts.
    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 * self.input_per_m + output_tokens as f64 * self.output_per_m)
            / 1_000_000.0
    }

    pub fn is_free(&self) -> bool {
        self.input_per_m == 0.0 && self.output_per_m == 0.0
    }
}

/// Thread-safe pricing table keyed by model key.
pub struct PricingTable {
    prices: RwLock<HashMap<String, ModelPricing>>,
}

impl PricingTable {
    pub fn empty() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
        }
    }

    /// Build a table from `(model_key, pricing)` pairs.
    pub fn from_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, ModelPricing)>,
        K: Into<String>,
    {
        let prices = entries.into_iter().map(|(k, p)| (k.into(), p)).collect();
        Self {
            prices: RwLock::new(prices),
        }
    }

    /// Look up pricing for a model. Returns None if not found.
    pub fn get(&self, model_key: &str) -> Option<ModelPricing> {
        let prices = self.prices.read().unwrap_or_else(PoisonError::into_inner);
        prices.get(model_key).copied()
    }

    /// Add or update pricing for a model.
    pub fn set(&self, model_key: impl Into<String>, pricing: ModelPricing) {
        let mut prices = self.prices.write().unwrap_or_else(PoisonError::into_inner);
        prices.insert(model_key.into(), pricing);
    }

    /// Compute cost for a model call, returning 0.0 if the model is unknown.
    ///
    /// Tries the exact key first, then the bare name after a provider
    /// prefix (`ollama/qwen2.5` → `qwen2.5`).
    pub fn compute_cost(&self, model_key: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        let prices = self.prices.read().unwrap_or_else(PoisonError::into_inner);

        if let Some(p) = prices.get(model_key) {
            return p.cost(input_tokens, output_tokens);
        }

        let bare = model_key.rsplit('/').next().unwrap_or(model_key);
        prices
            .iter()
            .find(|(key, _)| key.rsplit('/').next() == Some(bare))
            .map(|(_, p)| p.cost(input_tokens, output_tokens))
            .unwrap_or(0.0)
    }

    /// List all known model keys, sorted.
    pub fn models(&self) -> Vec<String> {
        let prices = self.prices.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = prices.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.prices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_cost() {
        let table = PricingTable::from_entries([("deepseek-chat", ModelPricing::new(0.27, 1.10))]);
        // (1000 * 0.27 + 500 * 1.10) / 1M
        let cost = table.compute_cost("deepseek-chat", 1000, 500);
        assert!((cost - 0.00082).abs() < 1e-12);
    }

    #[test]
    fn unknown_model_returns_zero() {
        let table = PricingTable::empty();
        assert!(table.is_empty());
        assert_eq!(table.compute_cost("unknown/model-xyz", 1000, 500), 0.0);
    }

    #[test]
    fn provider_prefix_falls_back_to_bare_name() {
        let table = PricingTable::empty();
        table.set("gpt-4o", ModelPricing::new(2.5, 10.0));
        let cost = table.compute_cost("openai/gpt-4o", 1_000_000, 0);
        assert!((cost - 2.5).abs() < 1e-10);
    }

    #[test]
    fn model_pricing_cost() {
        let p = ModelPricing::new(5.0, 15.0);
        // 500 input, 200 output → (500*5 + 200*15) / 1M = 0.0055
        assert!((p.cost(500, 200) - 0.0055).abs() < 1e-10);
        assert!(!p.is_free());
        assert!(ModelPricing::default().is_free());
    }

    #[test]
    fn set_overrides_existing_and_lists_sorted() {
        let table = PricingTable::from_entries([
            ("b", ModelPricing::new(1.0, 1.0)),
            ("a", ModelPricing::new(1.0, 1.0)),
        ]);
        table.set("b", ModelPricing::new(4.0, 0.0));
        assert_eq!(table.get("b"), Some(ModelPricing::new(4.0, 0.0)));
        assert_eq!(table.models(), vec!["a", "b"]);
        assert_eq!(table.len(), 2);
    }
}
