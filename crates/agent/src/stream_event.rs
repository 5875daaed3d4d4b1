//! Agent-level streaming events.
//!
//! `AgentStreamEvent` mirrors the four engine callbacks so a caller can
//! follow the loop over a channel instead of closures.

use ferroact_core::agent::{AgentResponse, ResponseStatus};
use ferroact_core::provider::Usage;
use serde::{Deserialize, Serialize};

/// Events emitted by the engine while it works on one message:
/// - `thinking`: a reasoning step from the model
/// - `action`: a tool call about to run
/// - `observation`: the tool's result
/// - `final`: the response, always last
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    Thinking { content: String },

    Action {
        tool_name: String,
        arguments: serde_json::Value,
    },

    Observation {
        tool_name: String,
        output: String,
        success: bool,
        duration_ms: u64,
    },

    Final {
        conversation_id: String,
        content: String,
        status: ResponseStatus,
        iterations: u32,
        usage: Usage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        degraded_reason: Option<String>,
    },
}

impl AgentStreamEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Thinking { .. } => "thinking",
            Self::Action { .. } => "action",
            Self::Observation { .. } => "observation",
            Self::Final { .. } => "final",
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Self::Final { .. })
    }
}

impl From<&AgentResponse> for AgentStreamEvent {
    fn from(response: &AgentResponse) -> Self {
        Self::Final {
            conversation_id: response.conversation_id.to_string(),
            content: response.content.clone(),
            status: response.status,
            iterations: response.iterations,
            usage: response.usage,
            degraded_reason: response.degraded_reason.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferroact_core::message::ConversationId;

    #[test]
    fn event_serialization_action() {
        let event = AgentStreamEvent::Action {
            tool_name: "calculator".into(),
            arguments: serde_json::json!({"expression": "2+2"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"action""#));
        assert!(json.contains(r#""tool_name":"calculator""#));
    }

    #[test]
    fn final_from_response() {
        let response = AgentResponse {
            conversation_id: ConversationId::from("abc"),
            content: "42".into(),
            status: ResponseStatus::Partial,
            iterations: 3,
            observations: Vec::new(),
            usage: Usage::new(10, 5),
            degraded_reason: None,
            timestamp: chrono::Utc::now(),
        };
        let event = AgentStreamEvent::from(&response);
        assert!(event.is_final());
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"final""#));
        assert!(json.contains(r#""status":"partial""#));
        assert!(!json.contains("degraded_reason"));
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{"type":"thinking","content":"hmm"}"#;
        match serde_json::from_str::<AgentStreamEvent>(json).unwrap() {
            AgentStreamEvent::Thinking { content } => assert_eq!(content, "hmm"),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn event_type_names() {
        let observation = AgentStreamEvent::Observation {
            tool_name: "t".into(),
            output: "o".into(),
            success: true,
            duration_ms: 1,
        };
        assert_eq!(observation.event_type(), "observation");
        assert_eq!(AgentStreamEvent::Thinking { content: "x".into() }.event_type(), "thinking");
    }
}
