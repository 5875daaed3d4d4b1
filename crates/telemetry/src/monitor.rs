//! Thread-safe token monitor: enforces per-window budgets and serves usage
//! reports.

use crate::TelemetryError;
use crate::model::*;
use chrono::{DateTime, Utc};
use ferroact_config::TokenConfig;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Minimum spacing between idle-budget sweeps triggered by tracking.
const SWEEP_INTERVAL_SECS: i64 = 60;

/// Tracks token consumption per budget key.
///
/// Conversations are charged to the user they are bound to, or to their own
/// id when unbound. All counter updates for every key go through a single
/// lock, so concurrent increments never interleave.
///
/// Budgets whose windows have all elapsed and that have no retained usage
/// records are evicted; a later call for the key starts a fresh budget.
pub struct TokenMonitor {
    limits: WindowLimits,
    retention: chrono::Duration,
    budgets: Mutex<HashMap<String, TokenBudget>>,
    bindings: RwLock<HashMap<String, String>>,
    records: Mutex<Vec<TokenUsage>>,
    last_sweep: Mutex<Option<DateTime<Utc>>>,
}

impl TokenMonitor {
    pub fn new(limits: WindowLimits) -> Self {
        Self {
            limits,
            retention: chrono::Duration::days(30),
            budgets: Mutex::new(HashMap::new()),
            bindings: RwLock::new(HashMap::new()),
            records: Mutex::new(Vec::new()),
            last_sweep: Mutex::new(None),
        }
    }

    pub fn from_config(config: &TokenConfig) -> Self {
        let mut monitor = Self::new(WindowLimits {
            per_minute: config.per_minute,
            per_hour: config.per_hour,
            per_day: config.per_day,
        });
        monitor.retention = chrono::Duration::days(i64::from(config.retention_days));
        monitor
    }

    pub fn limits(&self) -> WindowLimits {
        self.limits
    }

    /// Rough token estimate: one token per four characters, rounded up.
    pub fn estimate_tokens(text: &str) -> u64 {
        text.chars().count().div_ceil(4) as u64
    }

    /// Charge a conversation's usage to `user_id` from now on.
    pub fn bind_conversation(&self, conversation_id: &str, user_id: &str) {
        self.bindings
            .write()
            .insert(conversation_id.to_string(), user_id.to_string());
    }

    /// Stop charging a conversation to its bound user.
    pub fn unbind_conversation(&self, conversation_id: &str) {
        self.bindings.write().remove(conversation_id);
    }

    fn budget_key(&self, conversation_id: &str) -> String {
        self.bindings
            .read()
            .get(conversation_id)
            .cloned()
            .unwrap_or_else(|| conversation_id.to_string())
    }

    // ── Enforcement ───────────────────────────────────────────────────

    /// Whether a call of `estimated` tokens fits every window's remaining
    /// budget.
    pub fn check_token_limit(&self, conversation_id: &str, estimated: u64) -> bool {
        self.ensure_within_budget(conversation_id, estimated).is_ok()
    }

    /// Like [`check_token_limit`](Self::check_token_limit), naming the
    /// window that would be exceeded.
    pub fn ensure_within_budget(
        &self,
        conversation_id: &str,
        estimated: u64,
    ) -> Result<(), TelemetryError> {
        self.ensure_within_budget_at(conversation_id, estimated, Utc::now())
    }

    fn ensure_within_budget_at(
        &self,
        conversation_id: &str,
        estimated: u64,
        now: DateTime<Utc>,
    ) -> Result<(), TelemetryError> {
        let key = self.budget_key(conversation_id);
        let mut budgets = self.budgets.lock();
        let mut fresh;
        let budget = match budgets.get_mut(&key) {
            Some(budget) => budget,
            None => {
                fresh = TokenBudget::new(&key, self.limits, now);
                &mut fresh
            }
        };

        for counter in budget.counters_mut() {
            counter.roll_over(now);
            if counter.consumed.saturating_add(estimated) > counter.limit {
                tracing::warn!(
                    key = %key,
                    window = %counter.window,
                    estimated,
                    remaining = counter.remaining(),
                    "Token budget would be exceeded"
                );
                return Err(TelemetryError::BudgetExceeded {
                    key,
                    window: counter.window,
                    requested: estimated,
                    remaining: counter.remaining(),
                });
            }
        }
        Ok(())
    }

    /// Record actual usage reported by a provider.
    pub fn track_token_usage(&self, conversation_id: &str, input: u64, output: u64) -> TokenUsage {
        self.track_token_usage_at(conversation_id, input, output, Utc::now())
    }

    fn track_token_usage_at(
        &self,
        conversation_id: &str,
        input: u64,
        output: u64,
        now: DateTime<Utc>,
    ) -> TokenUsage {
        let key = self.budget_key(conversation_id);
        {
            let mut budgets = self.budgets.lock();
            let budget = budgets
                .entry(key.clone())
                .or_insert_with(|| TokenBudget::new(&key, self.limits, now));
            for counter in budget.counters_mut() {
                counter.roll_over(now);
                counter.consumed = counter.consumed.saturating_add(input + output);
            }
        }

        let usage = TokenUsage {
            conversation_id: conversation_id.to_string(),
            user_id: key,
            input_tokens: input,
            output_tokens: output,
            recorded_at: now,
        };

        {
            let mut records = self.records.lock();
            let cutoff = now - self.retention;
            records.retain(|r| r.recorded_at >= cutoff);
            records.push(usage.clone());
        }
        self.maybe_sweep(now);

        tracing::debug!(
            conversation_id,
            user_id = %usage.user_id,
            input,
            output,
            "Token usage recorded"
        );
        usage
    }

    // ── Queries ───────────────────────────────────────────────────────

    /// Current budget state for a key, with elapsed windows rolled over.
    pub fn get_token_budget(&self, user_id: &str) -> TokenBudget {
        self.get_token_budget_at(user_id, Utc::now())
    }

    fn get_token_budget_at(&self, user_id: &str, now: DateTime<Utc>) -> TokenBudget {
        let mut budgets = self.budgets.lock();
        let Some(budget) = budgets.get_mut(user_id) else {
            return TokenBudget::new(user_id, self.limits, now);
        };
        for counter in budget.counters_mut() {
            counter.roll_over(now);
        }
        budget.clone()
    }

    /// Aggregate a key's usage records within `[from, to]`.
    pub fn generate_usage_report(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<UsageReport, TelemetryError> {
        if from > to {
            return Err(TelemetryError::InvalidRange { from, to });
        }

        let records = self.records.lock();
        let mut input_total = 0u64;
        let mut output_total = 0u64;
        let mut requests = 0u64;
        let mut by_conversation: HashMap<&str, ConversationUsage> = HashMap::new();
        let mut by_day: BTreeMap<chrono::NaiveDate, DailyUsage> = BTreeMap::new();

        for record in records
            .iter()
            .filter(|r| r.user_id == user_id && r.recorded_at >= from && r.recorded_at <= to)
        {
            input_total += record.input_tokens;
            output_total += record.output_tokens;
            requests += 1;

            let conv = by_conversation
                .entry(record.conversation_id.as_str())
                .or_insert_with(|| ConversationUsage {
                    conversation_id: record.conversation_id.clone(),
                    input_tokens: 0,
                    output_tokens: 0,
                    requests: 0,
                });
            conv.input_tokens += record.input_tokens;
            conv.output_tokens += record.output_tokens;
            conv.requests += 1;

            let date = record.recorded_at.date_naive();
            let day = by_day.entry(date).or_insert(DailyUsage {
                date,
                total_tokens: 0,
                requests: 0,
            });
            day.total_tokens += record.total();
            day.requests += 1;
        }

        let mut by_conversation: Vec<ConversationUsage> = by_conversation.into_values().collect();
        by_conversation.sort_by(|a, b| {
            (b.input_tokens + b.output_tokens)
                .cmp(&(a.input_tokens + a.output_tokens))
                .then_with(|| a.conversation_id.cmp(&b.conversation_id))
        });

        Ok(UsageReport {
            user_id: user_id.to_string(),
            from,
            to,
            total_input_tokens: input_total,
            total_output_tokens: output_total,
            requests,
            by_conversation,
            by_day: by_day.into_values().collect(),
        })
    }

    /// Number of retained usage records.
    pub fn record_count(&self) -> usize {
        self.records.lock().len()
    }

    /// Number of keys with live budget state.
    pub fn budget_count(&self) -> usize {
        self.budgets.lock().len()
    }

    // ── Housekeeping ──────────────────────────────────────────────────

    /// Drop expired records and idle budgets. Returns how many budgets
    /// were evicted.
    pub fn sweep_idle(&self) -> usize {
        self.sweep_idle_at(Utc::now())
    }

    fn sweep_idle_at(&self, now: DateTime<Utc>) -> usize {
        let active: HashSet<String> = {
            let mut records = self.records.lock();
            let cutoff = now - self.retention;
            records.retain(|r| r.recorded_at >= cutoff);
            records.iter().map(|r| r.user_id.clone()).collect()
        };

        let mut budgets = self.budgets.lock();
        let before = budgets.len();
        budgets.retain(|key, budget| active.contains(key) || !budget.is_idle(now));
        let evicted = before - budgets.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = budgets.len(), "Idle token budgets evicted");
        }
        evicted
    }

    fn maybe_sweep(&self, now: DateTime<Utc>) {
        {
            let mut last = self.last_sweep.lock();
            if last.is_some_and(|at| now - at < chrono::Duration::seconds(SWEEP_INTERVAL_SECS)) {
                return;
            }
            *last = Some(now);
        }
        self.sweep_idle_at(now);
    }
}

impl Default for TokenMonitor {
    fn default() -> Self {
        Self::from_config(&TokenConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn monitor(per_minute: u64, per_hour: u64, per_day: u64) -> TokenMonitor {
        TokenMonitor::new(WindowLimits {
            per_minute,
            per_hour,
            per_day,
        })
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn estimate_is_four_chars_per_token() {
        assert_eq!(TokenMonitor::estimate_tokens(""), 0);
        assert_eq!(TokenMonitor::estimate_tokens("abcd"), 1);
        assert_eq!(TokenMonitor::estimate_tokens("abcde"), 2);
    }

    #[test]
    fn check_fails_once_projection_exceeds_remaining() {
        let m = monitor(100, 1_000, 10_000);
        assert!(m.ensure_within_budget_at("conv", 100, t0()).is_ok());

        m.track_token_usage_at("conv", 60, 20, t0());
        assert!(m.ensure_within_budget_at("conv", 20, t0()).is_ok());

        let err = m.ensure_within_budget_at("conv", 21, t0()).unwrap_err();
        match err {
            TelemetryError::BudgetExceeded {
                window, remaining, ..
            } => {
                assert_eq!(window, TokenWindow::Minute);
                assert_eq!(remaining, 20);
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn minute_window_resets_at_boundary() {
        let m = monitor(100, 1_000, 10_000);
        m.track_token_usage_at("conv", 100, 0, t0());
        assert!(m.ensure_within_budget_at("conv", 1, t0() + Duration::seconds(30)).is_err());
        assert!(m.ensure_within_budget_at("conv", 1, t0() + Duration::seconds(60)).is_ok());

        // The hour window keeps counting
        let budget = m.get_token_budget_at("conv", t0() + Duration::seconds(61));
        assert_eq!(budget.minute.consumed, 0);
        assert_eq!(budget.hour.consumed, 100);
    }

    #[test]
    fn bound_conversations_share_the_user_budget() {
        let m = monitor(100, 1_000, 10_000);
        m.bind_conversation("conv-a", "alice");
        m.bind_conversation("conv-b", "alice");

        m.track_token_usage_at("conv-a", 50, 0, t0());
        m.track_token_usage_at("conv-b", 40, 0, t0());

        assert_eq!(m.get_token_budget_at("alice", t0()).minute.consumed, 90);
        assert!(m.ensure_within_budget_at("conv-b", 11, t0()).is_err());
        // Unbound conversations have their own budget
        assert!(m.ensure_within_budget_at("conv-c", 100, t0()).is_ok());
    }

    #[test]
    fn usage_report_breakdowns() {
        let m = monitor(1_000_000, 1_000_000, 1_000_000);
        m.bind_conversation("conv-a", "alice");
        m.bind_conversation("conv-b", "alice");

        m.track_token_usage_at("conv-a", 100, 50, t0());
        m.track_token_usage_at("conv-b", 10, 5, t0());
        m.track_token_usage_at("conv-a", 20, 10, t0() + Duration::days(1));
        m.track_token_usage_at("conv-x", 999, 999, t0());

        let report = m
            .generate_usage_report("alice", t0() - Duration::hours(1), t0() + Duration::days(2))
            .unwrap();
        assert_eq!(report.requests, 3);
        assert_eq!(report.total_tokens(), 195);
        assert_eq!(report.by_conversation[0].conversation_id, "conv-a");
        assert_eq!(report.by_conversation[0].requests, 2);
        assert_eq!(report.by_day.len(), 2);
        assert_eq!(report.by_day[0].total_tokens, 165);
    }

    #[test]
    fn report_rejects_inverted_range() {
        let m = monitor(10, 10, 10);
        assert!(m.generate_usage_report("alice", t0(), t0() - Duration::hours(1)).is_err());
    }

    #[test]
    fn old_records_are_pruned() {
        let mut m = monitor(1_000, 1_000, 1_000);
        m.retention = Duration::days(1);
        m.track_token_usage_at("conv", 1, 1, t0());
        m.track_token_usage_at("conv", 1, 1, t0() + Duration::days(2));
        assert_eq!(m.record_count(), 1);
    }

    #[test]
    fn idle_budgets_are_evicted_after_retention() {
        let mut m = monitor(1_000, 1_000, 1_000);
        m.retention = Duration::days(1);
        for i in 0..50 {
            m.track_token_usage_at(&format!("conv-{i}"), 1, 1, t0());
        }
        assert_eq!(m.budget_count(), 50);

        // Windows have elapsed but records are still retained
        let later = t0() + Duration::hours(25);
        assert_eq!(m.sweep_idle_at(t0() + Duration::hours(23)), 0);

        // Past retention the keys are gone; a later call starts fresh
        let much_later = t0() + Duration::days(3);
        assert_eq!(m.sweep_idle_at(much_later), 50);
        assert_eq!(m.budget_count(), 0);
        assert_eq!(m.record_count(), 0);
        assert_eq!(m.get_token_budget_at("conv-0", later).day.consumed, 0);
        assert_eq!(m.budget_count(), 0);
    }

    #[test]
    fn busy_budgets_survive_a_sweep() {
        let mut m = monitor(1_000, 1_000, 1_000);
        m.retention = Duration::hours(1);
        m.track_token_usage_at("idle", 5, 5, t0());
        m.track_token_usage_at("busy", 5, 5, t0() + Duration::hours(23));

        assert_eq!(m.sweep_idle_at(t0() + Duration::hours(26)), 1);
        assert_eq!(m.get_token_budget_at("busy", t0() + Duration::hours(26)).day.consumed, 10);
    }

    #[test]
    fn tracking_sweeps_periodically() {
        let mut m = monitor(1_000, 1_000, 1_000);
        m.retention = Duration::hours(1);
        m.track_token_usage_at("old", 1, 1, t0());
        m.track_token_usage_at("new", 1, 1, t0() + Duration::days(2));
        assert_eq!(m.budget_count(), 1);
    }

    #[test]
    fn queries_do_not_create_budgets() {
        let m = monitor(100, 1_000, 10_000);
        assert!(m.ensure_within_budget_at("nobody", 10, t0()).is_ok());
        assert_eq!(m.get_token_budget_at("nobody", t0()).remaining(), 100);
        assert_eq!(m.budget_count(), 0);
    }

    #[test]
    fn unbinding_charges_the_conversation_again() {
        let m = monitor(100, 1_000, 10_000);
        m.bind_conversation("conv", "alice");
        m.unbind_conversation("conv");
        m.track_token_usage_at("conv", 10, 0, t0());
        assert_eq!(m.get_token_budget_at("conv", t0()).minute.consumed, 10);
        assert_eq!(m.get_token_budget_at("alice", t0()).minute.consumed, 0);
    }

    #[test]
    fn concurrent_tracking_is_serialized() {
        let m = Arc::new(monitor(u64::MAX / 2, u64::MAX / 2, u64::MAX / 2));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = m.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        m.track_token_usage("conv", 1, 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(m.get_token_budget("conv").day.consumed, 1_600);
    }
}
