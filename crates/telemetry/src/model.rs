//! Data model for token budgets, usage records, and usage reports.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ── Windows ───────────────────────────────────────────────────────────────

/// A fixed-length budget window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenWindow {
    Minute,
    Hour,
    Day,
}

impl TokenWindow {
    pub const ALL: [TokenWindow; 3] = [Self::Minute, Self::Hour, Self::Day];

    pub fn length(&self) -> chrono::Duration {
        match self {
            Self::Minute => chrono::Duration::minutes(1),
            Self::Hour => chrono::Duration::hours(1),
            Self::Day => chrono::Duration::days(1),
        }
    }
}

impl std::fmt::Display for TokenWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minute => write!(f, "per-minute"),
            Self::Hour => write!(f, "per-hour"),
            Self::Day => write!(f, "per-day"),
        }
    }
}

/// Configured ceilings for each window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowLimits {
    pub per_minute: u64,
    pub per_hour: u64,
    pub per_day: u64,
}

impl WindowLimits {
    pub fn limit(&self, window: TokenWindow) -> u64 {
        match window {
            TokenWindow::Minute => self.per_minute,
            TokenWindow::Hour => self.per_hour,
            TokenWindow::Day => self.per_day,
        }
    }
}

/// Consumption within one window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowCounter {
    pub window: TokenWindow,
    pub limit: u64,
    pub consumed: u64,
    pub window_start: DateTime<Utc>,
}

impl WindowCounter {
    pub fn new(window: TokenWindow, limit: u64, now: DateTime<Utc>) -> Self {
        Self {
            window,
            limit,
            consumed: 0,
            window_start: now,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.consumed)
    }

    pub(crate) fn has_elapsed(&self, now: DateTime<Utc>) -> bool {
        now - self.window_start >= self.window.length()
    }

    /// Start a fresh window once the current one has elapsed.
    pub(crate) fn roll_over(&mut self, now: DateTime<Utc>) -> bool {
        if self.has_elapsed(now) {
            self.consumed = 0;
            self.window_start = now;
            true
        } else {
            false
        }
    }
}

// ── Budget ────────────────────────────────────────────────────────────────

/// Per-key budget state across the three windows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenBudget {
    /// The budget owner (a user id, or a conversation id when unbound).
    pub user_id: String,
    pub minute: WindowCounter,
    pub hour: WindowCounter,
    pub day: WindowCounter,
}

impl TokenBudget {
    pub fn new(user_id: impl Into<String>, limits: WindowLimits, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            minute: WindowCounter::new(TokenWindow::Minute, limits.per_minute, now),
            hour: WindowCounter::new(TokenWindow::Hour, limits.per_hour, now),
            day: WindowCounter::new(TokenWindow::Day, limits.per_day, now),
        }
    }

    pub fn counters(&self) -> [&WindowCounter; 3] {
        [&self.minute, &self.hour, &self.day]
    }

    pub(crate) fn counters_mut(&mut self) -> [&mut WindowCounter; 3] {
        [&mut self.minute, &mut self.hour, &mut self.day]
    }

    /// Every window has run out, so the budget is indistinguishable from a
    /// fresh one.
    pub(crate) fn is_idle(&self, now: DateTime<Utc>) -> bool {
        self.counters().iter().all(|c| c.has_elapsed(now))
    }

    /// Tightest remaining allowance across windows.
    pub fn remaining(&self) -> u64 {
        self.counters()
            .iter()
            .map(|c| c.remaining())
            .min()
            .unwrap_or(0)
    }
}

// ── Usage ─────────────────────────────────────────────────────────────────

/// One recorded provider call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub conversation_id: String,
    /// Key the usage was charged to.
    pub user_id: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub recorded_at: DateTime<Utc>,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationUsage {
    pub conversation_id: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub requests: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub total_tokens: u64,
    pub requests: u64,
}

/// Aggregated usage for one key over a time range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageReport {
    pub user_id: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub requests: u64,
    /// Sorted by total tokens, largest first.
    pub by_conversation: Vec<ConversationUsage>,
    /// Sorted by date.
    pub by_day: Vec<DailyUsage>,
}

impl UsageReport {
    pub fn total_tokens(&self) -> u64 {
        self.total_input_tokens + self.total_output_tokens
    }
}
