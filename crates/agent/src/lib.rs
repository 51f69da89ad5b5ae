//! The agent execution core.
//!
//! The agent follows a **Reason → Act → Observe** cycle:
//!
//! 1. **Receive** user text and append it to the current session
//! 2. **Select** a model able to handle the turn
//! 3. **Build context**: the session history, truncated by whole rounds to
//!    fit the model's context window
//! 4. **Call the model** through the registry (blocking or streamed)
//! 5. **If tool calls**: execute them in order, append the results, loop
//! 6. **Otherwise**: store the answer and return it
//!
//! The loop also stops at the step limit or after too many consecutive
//! tool failures. Every transition is published on the event bus.

pub mod accumulator;
pub mod context;
pub mod files;
pub mod loop_runner;
pub mod response;
pub mod session;
pub mod stream_event;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use accumulator::{PartialToolCall, ToolCallAccumulator};
pub use files::{GeneratedFile, detect_generated_file};
pub use loop_runner::{Agent, STEP_LIMIT_MESSAGE};
pub use response::{AgentResponse, AgentStep, TurnOutcome};
pub use session::{Session, SessionManager};
pub use stream_event::AgentStreamEvent;
