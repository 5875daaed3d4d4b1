//! Error types for the FerroAct domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] rolls them up.

use crate::category::ResourceCategory;
use thiserror::Error;

/// The top-level error type for all FerroAct operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Resilience rejection: {0}")]
    Resilience(#[from] ResilienceError),

    #[error("Token budget exceeded for '{key}': {reason}")]
    TokenBudgetExceeded { key: String, reason: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model '{model}' is not supported by provider '{provider}'")]
    ModelNotSupported { provider: String, model: String },

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),

    #[error("Provider call rejected: {0}")]
    Rejected(ResilienceError),

    #[error("All providers failed (tried: {}): {last_error}", attempted.join(", "))]
    Exhausted {
        attempted: Vec<String>,
        last_error: String,
    },
}

impl ProviderError {
    /// Whether a retry against the same provider could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ApiError { status_code, .. } => *status_code == 429 || *status_code >= 500,
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Network(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Memory operation rejected: {0}")]
    Rejected(ResilienceError),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid parameter '{parameter}' for {tool_name}: {reason}")]
    InvalidParameter {
        tool_name: String,
        parameter: String,
        reason: String,
    },

    #[error("Tool timed out: {tool_name} exceeded {limit_ms}ms (ran {elapsed_ms}ms)")]
    Timeout {
        tool_name: String,
        limit_ms: u64,
        elapsed_ms: u64,
    },

    #[error("Permission denied: {tool_name} — {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool call rejected: {tool_name} — {reason}")]
    Rejected { tool_name: String, reason: String },
}

impl ToolError {
    /// Shorthand used by tool bodies.
    pub fn failed(tool_name: &str, reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            tool_name: tool_name.to_string(),
            reason: reason.into(),
        }
    }
}

/// A uniform rejection raised by the resilience layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResilienceError {
    #[error("{category} bulkhead full ({max_concurrent} concurrent calls)")]
    BulkheadFull {
        category: ResourceCategory,
        max_concurrent: usize,
    },

    #[error("{category} circuit '{instance}' is open")]
    CircuitOpen {
        category: ResourceCategory,
        instance: String,
    },

    #[error("{category} call failed after {attempts} attempt(s): {last_error}")]
    RetriesExhausted {
        category: ResourceCategory,
        attempts: u32,
        last_error: String,
    },

    #[error("{category} call exceeded its {limit_ms}ms deadline")]
    DeadlineExceeded {
        category: ResourceCategory,
        limit_ms: u64,
    },
}

impl ResilienceError {
    pub fn category(&self) -> ResourceCategory {
        match self {
            Self::BulkheadFull { category, .. }
            | Self::CircuitOpen { category, .. }
            | Self::RetriesExhausted { category, .. }
            | Self::DeadlineExceeded { category, .. } => *category,
        }
    }
}
