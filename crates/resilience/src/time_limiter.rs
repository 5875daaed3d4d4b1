//! Deadline on a single unit of work.

use ferroact_config::TimeLimiterConfig;
use ferroact_core::ResourceCategory;
use ferroact_core::error::ResilienceError;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TimeLimiter {
    category: ResourceCategory,
    timeout: Duration,
}

impl TimeLimiter {
    pub fn new(category: ResourceCategory, config: &TimeLimiterConfig) -> Self {
        Self {
            category,
            timeout: config.timeout(),
        }
    }

    pub fn with_timeout(category: ResourceCategory, timeout: Duration) -> Self {
        Self { category, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `fut`, dropping it if the deadline passes first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, ResilienceError> {
        tokio::time::timeout(self.timeout, fut).await.map_err(|_| {
            tracing::warn!(
                category = %self.category,
                limit_ms = self.timeout.as_millis() as u64,
                "Call exceeded its deadline"
            );
            ResilienceError::DeadlineExceeded {
                category: self.category,
                limit_ms: self.timeout.as_millis() as u64,
            }
        })
    }
}
