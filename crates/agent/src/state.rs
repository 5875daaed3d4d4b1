//! Per-message ReAct state and its phase machine.

use ferroact_core::message::ConversationId;
use ferroact_core::tool::{ToolCall, ToolResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Thinking,
    Acting,
    Observing,
    Complete,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// THINKING → ACTING → OBSERVING → THINKING, THINKING or OBSERVING →
    /// COMPLETE, and any live phase → FAILED.
    pub fn can_transition_to(&self, next: Phase) -> bool {
        use Phase::*;
        match (self, next) {
            (Complete | Failed, _) => false,
            (_, Failed) => true,
            (Thinking, Acting) | (Thinking, Complete) => true,
            (Acting, Observing) => true,
            (Observing, Thinking) | (Observing, Complete) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Thinking => "THINKING",
            Self::Acting => "ACTING",
            Self::Observing => "OBSERVING",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("invalid phase transition {from} -> {to}")]
    InvalidTransition { from: Phase, to: Phase },

    #[error("iteration limit of {0} reached")]
    IterationLimit(u32),
}

/// Created per inbound message and discarded once terminal.
#[derive(Debug, Clone)]
pub struct ReActState {
    pub conversation_id: ConversationId,
    phase: Phase,
    pub current_thought: Option<String>,
    pending_action: Option<ToolCall>,
    observations: Vec<ToolResult>,
    iteration_count: u32,
    max_iterations: u32,
}

impl ReActState {
    pub fn new(conversation_id: ConversationId, max_iterations: u32) -> Self {
        Self {
            conversation_id,
            phase: Phase::Thinking,
            current_thought: None,
            pending_action: None,
            observations: Vec::new(),
            iteration_count: 0,
            max_iterations,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn pending_action(&self) -> Option<&ToolCall> {
        self.pending_action.as_ref()
    }

    /// Results in the order the calls were issued.
    pub fn observations(&self) -> &[ToolResult] {
        &self.observations
    }

    pub fn into_observations(self) -> Vec<ToolResult> {
        self.observations
    }

    pub fn has_iterations_left(&self) -> bool {
        self.iteration_count < self.max_iterations
    }

    pub fn transition(&mut self, next: Phase) -> Result<(), StateError> {
        if !self.phase.can_transition_to(next) {
            return Err(StateError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::trace!(conversation_id = %self.conversation_id, from = %self.phase, to = %next, "Phase transition");
        self.phase = next;
        Ok(())
    }

    /// THINKING → ACTING with `call` pending.
    pub fn begin_action(&mut self, call: ToolCall) -> Result<(), StateError> {
        self.transition(Phase::Acting)?;
        self.pending_action = Some(call);
        Ok(())
    }

    /// ACTING → OBSERVING, appending the result.
    pub fn record_observation(&mut self, result: ToolResult) -> Result<(), StateError> {
        self.transition(Phase::Observing)?;
        self.pending_action = None;
        self.observations.push(result);
        Ok(())
    }

    /// OBSERVING → THINKING, counting the finished iteration.
    pub fn next_iteration(&mut self) -> Result<(), StateError> {
        if self.iteration_count >= self.max_iterations {
            return Err(StateError::IterationLimit(self.max_iterations));
        }
        self.transition(Phase::Thinking)?;
        self.iteration_count += 1;
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), StateError> {
        self.transition(Phase::Complete)
    }

    /// Move to FAILED. A no-op when already terminal.
    pub fn fail(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = Phase::Failed;
            self.pending_action = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferroact_core::tool::ToolArgs;

    fn state(max: u32) -> ReActState {
        ReActState::new(ConversationId::from("c1"), max)
    }

    #[test]
    fn full_cycle() {
        let mut s = state(3);
        assert_eq!(s.phase(), Phase::Thinking);

        s.begin_action(ToolCall::new("calculator", ToolArgs::new())).unwrap();
        assert_eq!(s.phase(), Phase::Acting);
        assert_eq!(s.pending_action().unwrap().name, "calculator");

        s.record_observation(ToolResult::success("calculator", serde_json::json!(4.0), 1))
            .unwrap();
        assert_eq!(s.phase(), Phase::Observing);
        assert!(s.pending_action().is_none());

        s.next_iteration().unwrap();
        assert_eq!(s.phase(), Phase::Thinking);
        assert_eq!(s.iteration_count(), 1);

        s.complete().unwrap();
        assert!(s.phase().is_terminal());
        assert_eq!(s.observations().len(), 1);
    }

    #[test]
    fn direct_answer_from_thinking() {
        let mut s = state(1);
        assert!(s.complete().is_ok());
    }

    #[test]
    fn invalid_transitions_rejected() {
        let mut s = state(3);
        assert_eq!(
            s.transition(Phase::Observing),
            Err(StateError::InvalidTransition {
                from: Phase::Thinking,
                to: Phase::Observing
            })
        );
        assert!(s.record_observation(ToolResult::failure("t", "x", 0)).is_err());

        s.complete().unwrap();
        assert!(s.transition(Phase::Thinking).is_err());
        assert!(s.transition(Phase::Failed).is_err());
    }

    #[test]
    fn any_live_phase_can_fail() {
        for phase in [Phase::Thinking, Phase::Acting, Phase::Observing] {
            assert!(phase.can_transition_to(Phase::Failed));
        }
        let mut s = state(2);
        s.begin_action(ToolCall::new("t", ToolArgs::new())).unwrap();
        s.fail();
        assert_eq!(s.phase(), Phase::Failed);
        assert!(s.pending_action().is_none());
    }

    #[test]
    fn iteration_count_never_exceeds_max() {
        let mut s = state(1);
        s.begin_action(ToolCall::new("t", ToolArgs::new())).unwrap();
        s.record_observation(ToolResult::failure("t", "boom", 0)).unwrap();
        s.next_iteration().unwrap();
        assert!(!s.has_iterations_left());

        s.begin_action(ToolCall::new("t", ToolArgs::new())).unwrap();
        s.record_observation(ToolResult::failure("t", "boom", 0)).unwrap();
        assert_eq!(s.next_iteration(), Err(StateError::IterationLimit(1)));
        assert_eq!(s.iteration_count(), 1);
    }

    #[test]
    fn phase_serializes_screaming() {
        assert_eq!(serde_json::to_string(&Phase::Observing).unwrap(), "\"OBSERVING\"");
    }
}
