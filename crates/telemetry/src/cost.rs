//! Thread-safe cost tracker: folds usage records into per-session,
//! per-day and per-model totals and watches the daily budget.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, NaiveDate, Utc};

use crate::model::*;

/// Records kept per session; older ones fall off, totals keep counting.
pub const SESSION_RECORD_LIMIT: usize = 200;

#[derive(Debug, Default)]
struct TrackerState {
    budget_limit: f64,
    total_calls: u64,
    total_tokens: u64,
    total_cost: f64,
    sessions: HashMap<String, SessionCost>,
    days: HashMap<NaiveDate, DailyCost>,
    models: HashMap<String, ModelCost>,
}

/// Aggregates usage. Share it behind an `Arc`; every method takes `&self`.
#[derive(Debug, Default)]
pub struct CostTracker {
    state: RwLock<TrackerState>,
}

impl CostTracker {
    /// `budget_limit` is USD per day; 0.0 disables the budget.
    pub fn new(budget_limit: f64) -> Self {
        Self {
            state: RwLock::new(TrackerState {
                budget_limit: budget_limit.max(0.0),
                ..Default::default()
            }),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, TrackerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, TrackerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Recording ─────────────────────────────────────────────────────

    /// Record one model call. `timestamp` defaults to now.
    pub fn record(&self, usage: &UsageRecord, session_id: &str, timestamp: Option<DateTime<Utc>>) {
        let ts = timestamp.unwrap_or_else(Utc::now);
        let tokens = u64::from(usage.total_tokens);
        let mut state = self.write();

        state.total_calls += 1;
        state.total_tokens += tokens;
        state.total_cost += usage.cost;

        let session = state
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionCost::new(session_id));
        session.total_tokens += tokens;
        session.total_cost += usage.cost;
        session.call_count += 1;
        if session.records.len() >= SESSION_RECORD_LIMIT {
            session.records.remove(0);
        }
        session.records.push(usage.clone());

        let day = ts.date_naive();
        let daily = state
            .days
            .entry(day)
            .or_insert_with(|| DailyCost::new(day));
        daily.total_tokens += tokens;
        daily.total_cost += usage.cost;
        daily.call_count += 1;

        let model = state
            .models
            .entry(usage.model_key.clone())
            .or_insert_with(|| ModelCost::new(&usage.model_key));
        model.total_tokens += tokens;
        model.prompt_tokens += u64::from(usage.prompt_tokens);
        model.completion_tokens += u64::from(usage.completion_tokens);
        model.total_cost += usage.cost;
        model.call_count += 1;

        if state.budget_limit > 0.0 {
            let today = Utc::now().date_naive();
            if let Some(spent) = state.days.get(&today).map(|d| d.total_cost)
                && spent >= state.budget_limit
            {
                tracing::warn!(
                    spent_usd = spent,
                    limit_usd = state.budget_limit,
                    "Daily spend has reached the budget limit"
                );
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────────────

    pub fn get_session_cost(&self, session_id: &str) -> Option<SessionCost> {
        self.read().sessions.get(session_id).cloned()
    }

    pub fn get_today_cost(&self) -> DailyCost {
        self.get_daily_cost(Utc::now().date_naive())
    }

    /// Totals for `date`; zeros when nothing was recorded that day.
    pub fn get_daily_cost(&self, date: NaiveDate) -> DailyCost {
        self.read()
            .days
            .get(&date)
            .cloned()
            .unwrap_or_else(|| DailyCost::new(date))
    }

    pub fn get_model_cost(&self, model_key: &str) -> Option<ModelCost> {
        self.read().models.get(model_key).cloned()
    }

    /// All models, most expensive first.
    pub fn get_all_model_costs(&self) -> Vec<ModelCost> {
        let mut costs: Vec<ModelCost> = self.read().models.values().cloned().collect();
        costs.sort_by(|a, b| b.total_cost.total_cmp(&a.total_cost));
        costs
    }

    /// The `days` most recent recorded days, newest first.
    pub fn get_daily_history(&self, days: usize) -> Vec<DailyCost> {
        let mut history: Vec<DailyCost> = self.read().days.values().cloned().collect();
        history.sort_by(|a, b| b.date.cmp(&a.date));
        history.truncate(days);
        history
    }

    // ── Totals ────────────────────────────────────────────────────────

    pub fn total_cost(&self) -> f64 {
        self.read().total_cost
    }

    pub fn total_tokens(&self) -> u64 {
        self.read().total_tokens
    }

    pub fn total_calls(&self) -> u64 {
        self.read().total_calls
    }

    pub fn budget_limit(&self) -> f64 {
        self.read().budget_limit
    }

    /// Negative limits clamp to 0.0 (unlimited).
    pub fn set_budget_limit(&self, limit: f64) {
        self.write().budget_limit = limit.max(0.0);
    }

    pub fn is_over_budget(&self) -> bool {
        let limit = self.budget_limit();
        limit > 0.0 && self.get_today_cost().total_cost >= limit
    }

    // ── Reporting ─────────────────────────────────────────────────────

    pub fn summary(&self) -> CostSummary {
        let today = self.get_today_cost();
        let (sessions, models_used, budget_limit_usd) = {
            let state = self.read();
            (state.sessions.len(), state.models.len(), state.budget_limit)
        };
        CostSummary {
            total_calls: self.total_calls(),
            total_tokens: self.total_tokens(),
            total_cost_usd: self.total_cost(),
            today: TodaySummary {
                calls: today.call_count,
                tokens: today.total_tokens,
                cost_usd: today.total_cost,
            },
            budget_limit_usd,
            over_budget: self.is_over_budget(),
            sessions,
            models_used,
        }
    }

    /// Plain-text report for terminals and logs.
    pub fn format_report(&self) -> String {
        let mut out = String::from("=== Steward cost report ===\n");
        let _ = writeln!(out, "Total calls:  {}", self.total_calls());
        let _ = writeln!(out, "Total tokens: {}", self.total_tokens());
        let _ = writeln!(out, "Total cost:   ${:.6}", self.total_cost());

        let today = self.get_today_cost();
        let _ = writeln!(
            out,
            "\nToday: {} calls | {} tokens | ${:.6}",
            today.call_count, today.total_tokens, today.total_cost
        );

        let limit = self.budget_limit();
        if limit > 0.0 {
            let pct = today.total_cost / limit * 100.0;
            let _ = writeln!(out, "Budget: ${limit:.2} | {pct:.1}% used");
        }

        let models = self.get_all_model_costs();
        if !models.is_empty() {
            out.push_str("\nBy model:\n");
            for mc in models {
                let _ = writeln!(
                    out,
                    "  {}: {} calls | {} tokens | ${:.6}",
                    mc.model_key, mc.call_count, mc.total_tokens, mc.total_cost
                );
            }
        }

        out.trim_end().to_string()
    }

    /// Forget everything except the budget limit.
    pub fn clear(&self) {
        let mut state = self.write();
        state.total_calls = 0;
        state.total_tokens = 0;
        state.total_cost = 0.0;
        state.sessions.clear();
        state.days.clear();
        state.models.clear();
    }
}
