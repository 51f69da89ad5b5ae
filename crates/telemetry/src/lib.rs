//! Usage accounting for Steward.
//!
//! Every completed model call produces one [`UsageRecord`]. The
//! [`CostTracker`] folds records into per-session, per-day and per-model
//! totals and warns once today's spend reaches the configured budget.

pub mod cost;
pub mod model;
pub mod pricing;

pub use cost::CostTracker;
pub use model::{CostSummary, DailyCost, ModelCost, SessionCost, TodaySummary, UsageRecord};
pub use pricing::{ModelPricing, PricingTable};
