//! Model registry, selection and retry for Steward.
//!
//! Concrete vendor clients live outside this crate; they implement
//! `steward_core::Provider` and are attached with
//! [`ModelRegistry::register_provider`].

pub mod model;
pub mod registry;
pub mod retry;
pub mod selector;

pub use model::ModelConfig;
pub use registry::{ChatResponse, CredentialSource, ModelRegistry, UsageSummary};
pub use retry::RetryPolicy;
pub use selector::{ModelSelector, SelectionCriteria, SelectionStrategy};
