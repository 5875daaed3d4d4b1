//! Token accounting and budget enforcement for FerroAct.
//!
//! The [`TokenMonitor`] is consulted before every provider call and updated
//! after it. Budgets are kept per key over fixed minute, hour, and day
//! windows; usage records back per-conversation and per-day reports.

pub mod model;
pub mod monitor;

pub use model::{
    ConversationUsage, DailyUsage, TokenBudget, TokenUsage, TokenWindow, UsageReport,
    WindowCounter, WindowLimits,
};
pub use monitor::TokenMonitor;

use chrono::{DateTime, Utc};

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("token budget exceeded for '{key}': {window} window has {remaining} tokens left, {requested} requested")]
    BudgetExceeded {
        key: String,
        window: TokenWindow,
        requested: u64,
        remaining: u64,
    },

    #[error("invalid report range: {from} is after {to}")]
    InvalidRange {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

impl From<TelemetryError> for ferroact_core::Error {
    fn from(err: TelemetryError) -> Self {
        let reason = err.to_string();
        match err {
            TelemetryError::BudgetExceeded { key, .. } => Self::TokenBudgetExceeded { key, reason },
            TelemetryError::InvalidRange { .. } => Self::Internal(reason),
        }
    }
}
