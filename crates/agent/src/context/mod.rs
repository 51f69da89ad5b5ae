//! Context-window management.
//!
//! Token estimation plus the round-based truncation that keeps a
//! conversation inside a model's context window without breaking the
//! assistant/tool pairing providers require.

pub mod token;
pub mod truncation;

pub use token::{estimate_message_tokens, estimate_messages_tokens};
pub use truncation::{enforce_message_cap, fit_to_window, group_rounds, truncate, validate_structure};
