//! Explicit decorator composition for one protected call.
//!
//! The bulkhead permit is held for the whole call including retries. The
//! breaker admits the call once and records one outcome for it; a call
//! cancelled mid-flight records none and frees its admission. Each retry
//! attempt gets its own deadline from the time limiter.

use ferroact_core::ResourceCategory;
use ferroact_core::error::ResilienceError;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::bulkhead::Bulkhead;
use crate::circuit_breaker::CircuitBreaker;
use crate::retry::{RetryPolicy, Retryable};
use crate::time_limiter::TimeLimiter;

/// Why a protected call did not produce a value.
#[derive(Debug, thiserror::Error)]
pub enum CallError<E> {
    /// The resilience layer refused or gave up on the call.
    #[error("{0}")]
    Rejected(ResilienceError),

    /// The work itself failed with a non-retryable error.
    #[error("{0}")]
    Failed(E),
}

impl<E> CallError<E> {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// Map the work error, keeping rejections as they are.
    pub fn map_failed<F>(self, f: impl FnOnce(E) -> F) -> CallError<F> {
        match self {
            Self::Rejected(r) => CallError::Rejected(r),
            Self::Failed(e) => CallError::Failed(f(e)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResiliencePipeline {
    category: ResourceCategory,
    bulkhead: Arc<Bulkhead>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    limiter: TimeLimiter,
}

enum Attempt<E> {
    Deadline(ResilienceError),
    Error(E),
}

impl ResiliencePipeline {
    pub fn new(
        category: ResourceCategory,
        bulkhead: Arc<Bulkhead>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
        limiter: TimeLimiter,
    ) -> Self {
        Self {
            category,
            bulkhead,
            breaker,
            retry,
            limiter,
        }
    }

    pub fn category(&self) -> ResourceCategory {
        self.category
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn timeout(&self) -> Duration {
        self.limiter.timeout()
    }

    /// Same pipeline with a different per-attempt deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.limiter = TimeLimiter::with_timeout(self.category, timeout);
        self
    }

    /// Same pipeline with a different retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run `op` through bulkhead, breaker, retry and time limiter.
    ///
    /// `op` is called once per attempt.
    pub async fn execute<T, E, F, Fut>(&self, mut op: F) -> Result<T, CallError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let _permit = self.bulkhead.acquire().await.map_err(CallError::Rejected)?;
        let admission = self.breaker.try_acquire().map_err(CallError::Rejected)?;

        let mut attempt: u32 = 0;
        let outcome = loop {
            let failure = match self.limiter.run(op()).await {
                Ok(Ok(value)) => break Ok(value),
                Ok(Err(e)) => Attempt::Error(e),
                Err(deadline) => Attempt::Deadline(deadline),
            };

            let retryable = match &failure {
                Attempt::Deadline(_) => true,
                Attempt::Error(e) => e.is_retryable(),
            };
            attempt += 1;

            if !retryable || attempt >= self.retry.max_attempts {
                break Err(self.give_up(failure, attempt, retryable));
            }

            let delay = self.retry.delay_for_attempt(attempt - 1);
            warn!(
                category = %self.category,
                instance = %self.breaker.instance(),
                attempt,
                max_attempts = self.retry.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %describe(&failure),
                "Call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        };

        match &outcome {
            Ok(_) => admission.success(),
            Err(_) => admission.failure(),
        }
        outcome
    }

    /// Like [`execute`](Self::execute), with a caller-supplied substitute
    /// produced when the call fails or is rejected.
    pub async fn execute_with_fallback<T, E, F, Fut, FB>(&self, op: F, fallback: FB) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
        FB: FnOnce(&CallError<E>) -> T,
    {
        match self.execute(op).await {
            Ok(value) => value,
            Err(err) => {
                debug!(category = %self.category, error = %err, "Serving fallback");
                fallback(&err)
            }
        }
    }

    fn give_up<E: Display>(&self, failure: Attempt<E>, attempts: u32, retryable: bool) -> CallError<E> {
        if retryable && self.retry.retries_enabled() {
            return CallError::Rejected(ResilienceError::RetriesExhausted {
                category: self.category,
                attempts,
                last_error: describe(&failure),
            });
        }
        match failure {
            Attempt::Deadline(d) => CallError::Rejected(d),
            Attempt::Error(e) => CallError::Failed(e),
        }
    }
}

fn describe<E: Display>(failure: &Attempt<E>) -> String {
    match failure {
        Attempt::Deadline(d) => d.to_string(),
        Attempt::Error(e) => e.to_string(),
    }
}
