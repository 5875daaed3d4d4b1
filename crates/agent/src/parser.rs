//! Parsing of model output in the Thought / Action / Action Input /
//! Final Answer format.
//!
//! ```text
//! Thought: I need to compute this.
//! Action: calculator
//! Action Input: {"expression": "2 + 2"}
//! ```
//!
//! Whichever of `Action` or `Final Answer` appears first decides the step.
//! Anything from an `Observation:` line onward is ignored, since the
//! observation is ours to supply. Output with neither marker is taken as
//! the final answer.

use ferroact_core::tool::ToolArgs;
use regex_lite::Regex;
use std::sync::LazyLock;

/// What the model asked for in one reasoning step.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Final {
        thought: Option<String>,
        answer: String,
    },
    Action {
        thought: Option<String>,
        tool: String,
        input: ActionInput,
    },
}

impl Step {
    pub fn thought(&self) -> Option<&str> {
        match self {
            Self::Final { thought, .. } | Self::Action { thought, .. } => thought.as_deref(),
        }
    }
}

/// The raw `Action Input`, before it is matched to a tool's parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionInput {
    Args(ToolArgs),
    Text(String),
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Thought,
    Action,
    ActionInput,
    Observation,
    FinalAnswer,
}

static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(thought|action\s*input|action|observation|final\s*answer)\s*:\s*(.*)$")
        .expect("label pattern is valid")
});

fn label_of(raw: &str) -> Label {
    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("thought") {
        Label::Thought
    } else if lower.contains("input") {
        Label::ActionInput
    } else if lower.starts_with("action") {
        Label::Action
    } else if lower.starts_with("observation") {
        Label::Observation
    } else {
        Label::FinalAnswer
    }
}

/// Split output into labelled sections, keeping continuation lines.
fn sections(output: &str) -> Vec<(Label, String)> {
    let mut out: Vec<(Label, String)> = Vec::new();
    for line in output.lines() {
        if let Some(caps) = LABEL_RE.captures(line) {
            let label = label_of(caps.get(1).map_or("", |m| m.as_str()));
            if label == Label::Observation {
                break;
            }
            let text = caps.get(2).map_or("", |m| m.as_str());
            out.push((label, text.to_string()));
        } else if let Some((_, text)) = out.last_mut() {
            text.push('\n');
            text.push_str(line);
        }
    }
    for (_, text) in &mut out {
        *text = text.trim().to_string();
    }
    out
}

pub fn parse_step(output: &str) -> Step {
    let sections = sections(output);

    let thought = sections
        .iter()
        .find(|(l, _)| *l == Label::Thought)
        .map(|(_, t)| t.clone())
        .filter(|t| !t.is_empty());

    let decisive = sections
        .iter()
        .position(|(l, _)| matches!(l, Label::Action | Label::FinalAnswer));

    match decisive.map(|i| (i, &sections[i])) {
        Some((_, (Label::FinalAnswer, answer))) => Step::Final {
            thought,
            answer: answer.clone(),
        },
        Some((i, (_, tool))) => {
            let input = sections[i + 1..]
                .iter()
                .take_while(|(l, _)| *l != Label::Action && *l != Label::FinalAnswer)
                .find(|(l, _)| *l == Label::ActionInput)
                .map(|(_, text)| parse_input(text))
                .unwrap_or(ActionInput::None);
            let tool = tool.trim().trim_matches('`').to_string();

            // Some models spell the final answer as an action.
            if tool.eq_ignore_ascii_case("final_answer") || tool.eq_ignore_ascii_case("final answer") {
                let answer = match input {
                    ActionInput::Text(t) => t,
                    ActionInput::Args(a) => serde_json::Value::Object(a).to_string(),
                    ActionInput::None => thought.clone().unwrap_or_default(),
                };
                return Step::Final { thought, answer };
            }
            Step::Action { thought, tool, input }
        }
        None => {
            let answer = thought.clone().unwrap_or_else(|| output.trim().to_string());
            Step::Final { thought, answer }
        }
    }
}

fn parse_input(text: &str) -> ActionInput {
    let cleaned = strip_code_fence(text);
    if cleaned.is_empty() {
        return ActionInput::None;
    }
    match serde_json::from_str::<serde_json::Value>(cleaned) {
        Ok(serde_json::Value::Object(map)) => ActionInput::Args(map),
        Ok(serde_json::Value::String(s)) => ActionInput::Text(s),
        _ => ActionInput::Text(cleaned.to_string()),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    // Drop an info string such as `json`.
    match inner.split_once('\n') {
        Some((first, rest)) if !first.trim_start().starts_with('{') => rest.trim(),
        _ => inner.trim(),
    }
}
