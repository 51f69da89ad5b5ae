//! Data model for usage records and cost aggregates.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::pricing::ModelPricing;

// ── Usage ─────────────────────────────────────────────────────────────────

/// Token accounting for exactly one completed model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Registry key of the model that answered.
    pub model_key: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    /// Cost in USD.
    pub cost: f64,
}

impl UsageRecord {
    /// Build a record, pricing it with per-million-token rates.
    pub fn priced(
        model_key: impl Into<String>,
        prompt_tokens: u32,
        completion_tokens: u32,
        total_tokens: u32,
        pricing: &ModelPricing,
    ) -> Self {
        Self {
            model_key: model_key.into(),
            prompt_tokens,
            completion_tokens,
            total_tokens,
            cost: pricing.cost(prompt_tokens, completion_tokens),
        }
    }
}

// ── Aggregates ────────────────────────────────────────────────────────────

/// Running totals for one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionCost {
    pub session_id: String,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub call_count: u64,
    /// The most recent records charged to this session, in arrival order.
    pub records: Vec<UsageRecord>,
}

impl SessionCost {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }
}

/// Running totals for one calendar day (UTC).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCost {
    pub date: NaiveDate,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub call_count: u64,
}

impl DailyCost {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            total_tokens: 0,
            total_cost: 0.0,
            call_count: 0,
        }
    }
}

/// Running totals for one model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelCost {
    pub model_key: String,
    pub total_tokens: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_cost: f64,
    pub call_count: u64,
}

impl ModelCost {
    pub fn new(model_key: impl Into<String>) -> Self {
        Self {
            model_key: model_key.into(),
            ..Default::default()
        }
    }
}

/// Today's slice of a [`CostSummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodaySummary {
    pub calls: u64,
    pub tokens: u64,
    pub cost_usd: f64,
}

/// Serializable overview of everything tracked so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub total_calls: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub today: TodaySummary,
    pub budget_limit_usd: f64,
    pub over_budget: bool,
    pub sessions: usize,
    pub models_used: usize,
}
