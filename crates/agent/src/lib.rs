//! The FerroAct agent: a ReAct reasoning loop.
//!
//! The engine follows a **Think → Act → Observe** cycle:
//!
//! 1. **Receive** a user message and resume the conversation's history
//! 2. **Think**: check the token budget, then ask a provider for the next step
//! 3. **Act**: if the step names a tool, run it through the tool executor
//! 4. **Observe**: append the tool's result and loop back to step 2
//! 5. **Answer**: return the final answer, or a degraded response when a
//!    dependency is unavailable
//!
//! The loop ends on a final answer or when the iteration limit is reached.

pub mod engine;
pub mod parser;
pub mod state;
pub mod stream_event;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use engine::{EngineConfig, ReactEngine, StreamCallbacks};
pub use parser::{ActionInput, Step, parse_step};
pub use state::{Phase, ReActState, StateError};
pub use stream_event::AgentStreamEvent;
