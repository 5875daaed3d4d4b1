//! Count-based circuit breaker.
//!
//! Keeps the outcomes of the last `sliding_window_size` calls. Once at least
//! `minimum_calls` outcomes are buffered and the failure rate reaches the
//! threshold, the breaker opens and rejects calls until
//! `wait_duration_in_open` has elapsed. The first call after that moves it
//! to half-open, where up to `permitted_calls_in_half_open` trial calls are
//! admitted: all of them succeeding closes the breaker, any failure opens it
//! again.
//!
//! Admission hands out a [`CallPermit`]. A permit dropped without an outcome
//! (the caller's future was cancelled) gives its trial slot back.

use ferroact_config::CircuitBreakerConfig;
use ferroact_core::ResourceCategory;
use ferroact_core::error::ResilienceError;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    /// `true` marks a failed call.
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    half_open_admitted: usize,
    half_open_successes: usize,
    /// Bumped on every move to half-open so stale permits can be told apart.
    trial_round: u64,
}

impl Inner {
    fn failure_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let failures = self.window.iter().filter(|f| **f).count();
        failures as f64 * 100.0 / self.window.len() as f64
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    category: ResourceCategory,
    instance: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(
        category: ResourceCategory,
        instance: impl Into<String>,
        config: CircuitBreakerConfig,
    ) -> Self {
        let window = VecDeque::with_capacity(config.sliding_window_size);
        Self {
            category,
            instance: instance.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                window,
                opened_at: None,
                half_open_admitted: 0,
                half_open_successes: 0,
                trial_round: 0,
            }),
        }
    }

    pub fn category(&self) -> ResourceCategory {
        self.category
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Current state. Reading never transitions; that happens on the next
    /// call attempt.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Failure percentage over the buffered window.
    pub fn failure_rate(&self) -> f64 {
        self.inner.lock().failure_rate()
    }

    pub fn buffered_calls(&self) -> usize {
        self.inner.lock().window.len()
    }

    /// Ask permission to make a call. Report the outcome through the
    /// returned permit.
    pub fn try_acquire(&self) -> Result<CallPermit<'_>, ResilienceError> {
        let mut inner = self.inner.lock();
        let trial = match inner.state {
            CircuitState::Closed => None,
            CircuitState::Open => {
                let waited_enough = inner
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.config.wait_duration_in_open());
                if !waited_enough {
                    return Err(self.open_error());
                }
                inner.state = CircuitState::HalfOpen;
                inner.half_open_admitted = 1;
                inner.half_open_successes = 0;
                inner.trial_round += 1;
                info!(
                    category = %self.category,
                    instance = %self.instance,
                    "Circuit breaker half-open, admitting trial calls"
                );
                Some(inner.trial_round)
            }
            CircuitState::HalfOpen => {
                if inner.half_open_admitted >= self.config.permitted_calls_in_half_open {
                    return Err(self.open_error());
                }
                inner.half_open_admitted += 1;
                Some(inner.trial_round)
            }
        };
        Ok(CallPermit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    /// Record a success that did not go through a permit.
    pub fn on_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => self.record(&mut inner, false),
            CircuitState::HalfOpen => self.trial_succeeded(&mut inner),
            // Late result from a call admitted before the breaker opened
            CircuitState::Open => {}
        }
    }

    /// Record a failure that did not go through a permit.
    pub fn on_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => self.record(&mut inner, true),
            CircuitState::HalfOpen => self.trip(&mut inner, "trial call failed"),
            CircuitState::Open => {}
        }
    }

    fn settle(&self, trial: Option<u64>, failed: bool) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => self.record(&mut inner, failed),
            // Only calls admitted in the current trial round decide it
            CircuitState::HalfOpen if trial == Some(inner.trial_round) => {
                if failed {
                    self.trip(&mut inner, "trial call failed");
                } else {
                    self.trial_succeeded(&mut inner);
                }
            }
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    fn release(&self, trial: Option<u64>) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen
            && trial == Some(inner.trial_round)
            && inner.half_open_admitted > 0
        {
            inner.half_open_admitted -= 1;
            debug!(
                category = %self.category,
                instance = %self.instance,
                "Trial call abandoned, slot released"
            );
        }
    }

    fn trial_succeeded(&self, inner: &mut Inner) {
        inner.half_open_successes += 1;
        if inner.half_open_successes >= self.config.permitted_calls_in_half_open {
            inner.state = CircuitState::Closed;
            inner.window.clear();
            inner.opened_at = None;
            inner.half_open_admitted = 0;
            inner.half_open_successes = 0;
            info!(
                category = %self.category,
                instance = %self.instance,
                "Circuit breaker closed"
            );
        }
    }

    /// Force the breaker back to closed with an empty window.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.window.clear();
        inner.opened_at = None;
        inner.half_open_admitted = 0;
        inner.half_open_successes = 0;
    }

    fn record(&self, inner: &mut Inner, failed: bool) {
        if inner.window.len() == self.config.sliding_window_size {
            inner.window.pop_front();
        }
        inner.window.push_back(failed);

        if inner.window.len() >= self.config.minimum_calls
            && inner.failure_rate() >= self.config.failure_rate_threshold
        {
            self.trip(inner, "failure rate threshold reached");
        }
    }

    fn trip(&self, inner: &mut Inner, reason: &str) {
        let failure_rate = inner.failure_rate();
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.half_open_admitted = 0;
        inner.half_open_successes = 0;
        warn!(
            category = %self.category,
            instance = %self.instance,
            failure_rate,
            reason,
            "Circuit breaker opened"
        );
    }

    fn open_error(&self) -> ResilienceError {
        ResilienceError::CircuitOpen {
            category: self.category,
            instance: self.instance.clone(),
        }
    }
}

/// Admission to one call. Settle it with [`success`](Self::success) or
/// [`failure`](Self::failure); dropping it unsettled frees its trial slot.
#[must_use = "report the call outcome through the permit"]
#[derive(Debug)]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: Option<u64>,
    settled: bool,
}

impl CallPermit<'_> {
    /// Whether this call was admitted as a half-open trial.
    pub fn is_trial(&self) -> bool {
        self.trial.is_some()
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.settle(self.trial, false);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.settle(self.trial, true);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.release(self.trial);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn breaker(window: usize, minimum: usize, half_open: usize) -> CircuitBreaker {
        CircuitBreaker::new(
            ResourceCategory::LlmProvider,
            "primary",
            CircuitBreakerConfig {
                failure_rate_threshold: 50.0,
                sliding_window_size: window,
                minimum_calls: minimum,
                wait_duration_in_open_ms: 1_000,
                permitted_calls_in_half_open: half_open,
            },
        )
    }

    fn fail(cb: &CircuitBreaker) -> Result<(), ResilienceError> {
        cb.try_acquire()?.failure();
        Ok(())
    }

    fn succeed(cb: &CircuitBreaker) -> Result<(), ResilienceError> {
        cb.try_acquire()?.success();
        Ok(())
    }

    #[test]
    fn opens_after_consecutive_failures() {
        let cb = breaker(4, 3, 2);
        for _ in 0..4 {
            let _ = fail(&cb);
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(matches!(
            cb.try_acquire(),
            Err(ResilienceError::CircuitOpen { .. })
        ));
    }

    #[test]
    fn stays_closed_below_minimum_calls() {
        let cb = breaker(4, 3, 2);
        fail(&cb).unwrap();
        fail(&cb).unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_rate(), 100.0);
    }

    #[test]
    fn stays_closed_below_threshold() {
        let cb = breaker(4, 3, 2);
        succeed(&cb).unwrap();
        succeed(&cb).unwrap();
        fail(&cb).unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn window_drops_oldest_outcome() {
        let cb = breaker(4, 4, 2);
        fail(&cb).unwrap();
        for _ in 0..4 {
            succeed(&cb).unwrap();
        }
        assert_eq!(cb.buffered_calls(), 4);
        assert_eq!(cb.failure_rate(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_successes_close() {
        let cb = breaker(4, 3, 2);
        for _ in 0..3 {
            fail(&cb).unwrap();
        }
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(1_001)).await;
        // Reading does not transition
        assert_eq!(cb.state(), CircuitState::Open);

        let trial = cb.try_acquire().unwrap();
        assert!(trial.is_trial());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        trial.success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        succeed(&cb).unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.buffered_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failure_reopens() {
        let cb = breaker(4, 3, 2);
        for _ in 0..3 {
            fail(&cb).unwrap();
        }
        tokio::time::advance(Duration::from_millis(1_001)).await;

        fail(&cb).unwrap();
        assert_eq!(cb.state(), CircuitState::Open);

        // Timer restarted
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(cb.try_acquire().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_limits_trial_calls() {
        let cb = breaker(4, 3, 2);
        for _ in 0..3 {
            fail(&cb).unwrap();
        }
        tokio::time::advance(Duration::from_millis(1_001)).await;

        let _first = cb.try_acquire().unwrap();
        let _second = cb.try_acquire().unwrap();
        assert!(cb.try_acquire().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_trial_frees_its_slot() {
        let cb = breaker(4, 3, 2);
        for _ in 0..3 {
            fail(&cb).unwrap();
        }
        tokio::time::advance(Duration::from_millis(1_001)).await;

        let first = cb.try_acquire().unwrap();
        let _second = cb.try_acquire().unwrap();
        assert!(cb.try_acquire().is_err());

        drop(first);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_every_trial_is_abandoned() {
        let cb = breaker(4, 3, 2);
        for _ in 0..3 {
            fail(&cb).unwrap();
        }
        tokio::time::advance(Duration::from_millis(1_001)).await;

        drop(cb.try_acquire().unwrap());
        drop(cb.try_acquire().unwrap());

        succeed(&cb).unwrap();
        succeed(&cb).unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_permit_does_not_touch_a_new_trial_round() {
        let cb = breaker(4, 3, 1);
        for _ in 0..3 {
            fail(&cb).unwrap();
        }
        tokio::time::advance(Duration::from_millis(1_001)).await;

        let stale = cb.try_acquire().unwrap();
        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(1_001)).await;
        let current = cb.try_acquire().unwrap();
        stale.failure();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.try_acquire().is_err());

        current.success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn reset_closes() {
        let cb = breaker(4, 3, 2);
        for _ in 0..3 {
            fail(&cb).unwrap();
        }
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(!cb.try_acquire().unwrap().is_trial());
    }
}
