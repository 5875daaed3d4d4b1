//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world:
//! evaluate arithmetic, read files, search the web, etc. Each tool declares
//! a typed parameter schema; arguments are validated and coerced against it
//! before the tool body ever runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::ToolError;

/// Tool arguments after parsing: parameter name to JSON value.
pub type ToolArgs = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Integer,
    Long,
    Double,
    Boolean,
    Array,
    Object,
}

impl ParameterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Long => "long",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Long | Self::Double)
    }
}

/// Declared shape of a single tool parameter.
///
/// `min`/`max` are numeric bounds for numeric types and length bounds for
/// strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDefinition {
    #[serde(rename = "type")]
    pub param_type: ParameterType,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl ParameterDefinition {
    pub fn new(param_type: ParameterType, description: impl Into<String>) -> Self {
        Self {
            param_type,
            description: description.into(),
            required: false,
            default: None,
            min: None,
            max: None,
            pattern: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }
}

/// A tool's public description, as listed to callers and shown to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: BTreeMap<String, ParameterDefinition>,
    #[serde(default)]
    pub is_async: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ToolDefinition {
    /// One-line rendering used in the system prompt.
    pub fn describe(&self) -> String {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|(name, def)| {
                let marker = if def.required { "" } else { "?" };
                format!("{name}{marker}: {}", def.param_type.as_str())
            })
            .collect();
        format!("{}({}) - {}", self.name, params.join(", "), self.description)
    }
}

/// A request to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    pub arguments: ToolArgs,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: ToolArgs) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            arguments,
        }
    }
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: String,

    pub success: bool,

    /// Present when `success` is true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,

    /// Present when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub executed_at: DateTime<Utc>,

    pub duration_ms: u64,
}

impl ToolResult {
    pub fn success(tool_name: impl Into<String>, value: serde_json::Value, duration_ms: u64) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            value: Some(value),
            error: None,
            executed_at: Utc::now(),
            duration_ms,
        }
    }

    pub fn failure(tool_name: impl Into<String>, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            value: None,
            error: Some(error.into()),
            executed_at: Utc::now(),
            duration_ms,
        }
    }

    /// Text fed back to the model as the observation.
    pub fn output_text(&self) -> String {
        match (&self.value, &self.error) {
            (_, Some(err)) if !self.success => format!("Error: {err}"),
            (Some(serde_json::Value::String(s)), _) => s.clone(),
            (Some(value), _) => value.to_string(),
            _ => String::new(),
        }
    }
}

/// The core Tool trait.
///
/// Each tool (calculator, file_read, web_search, etc.) implements this trait
/// and is registered with the tool executor under its name.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "calculator", "file_read").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    fn parameters(&self) -> BTreeMap<String, ParameterDefinition>;

    /// Whether the engine should dispatch this tool on a spawned task.
    fn is_async(&self) -> bool {
        false
    }

    /// Declared execution timeout, if the tool has one.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Execute with arguments that have already been validated and coerced.
    async fn execute(&self, args: ToolArgs) -> std::result::Result<serde_json::Value, ToolError>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
            is_async: self.is_async(),
            timeout_ms: self.timeout().map(|t| t.as_millis() as u64),
        }
    }
}
