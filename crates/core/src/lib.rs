//! # Steward Core
//!
//! Domain types, traits, and error definitions for the Steward agent runtime.
//! This crate carries no provider, tool, or storage implementation; it defines
//! the seams every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every collaborator is a trait here ([`Provider`], [`ToolExecutor`],
//! [`SessionStore`], [`EventHandler`]). Implementations are injected through
//! constructors, so several agent graphs can live in one process.

pub mod error;
pub mod event;
pub mod event_bus;
pub mod message;
pub mod provider;
pub mod storage;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{AgentEvent, WILDCARD};
pub use event_bus::{DEFAULT_PRIORITY, EventBus, EventHandler, SubscriptionId, handler_fn};
pub use message::{Message, Role, ToolCallRequest};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolCallDelta, Usage};
pub use storage::{InMemorySessionStore, SessionStore, StoredSession};
pub use tool::{NoTools, ToolExecutor, ToolResult, ToolStatus};
