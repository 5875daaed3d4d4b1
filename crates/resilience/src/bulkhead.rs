//! Concurrency bulkhead backed by a tokio semaphore.

use ferroact_config::BulkheadConfig;
use ferroact_core::ResourceCategory;
use ferroact_core::error::ResilienceError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Caps how many calls of one category are in flight at once.
#[derive(Debug)]
pub struct Bulkhead {
    category: ResourceCategory,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    max_wait: Option<Duration>,
}

impl Bulkhead {
    pub fn new(category: ResourceCategory, config: &BulkheadConfig) -> Self {
        Self {
            category,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_calls)),
            max_concurrent: config.max_concurrent_calls,
            max_wait: config.max_wait(),
        }
    }

    /// Take a permit. Rejects at once when full, unless a max wait is set.
    ///
    /// The permit is released when dropped.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, ResilienceError> {
        let permit = match self.max_wait {
            None => self.semaphore.clone().try_acquire_owned().ok(),
            Some(wait) => tokio::time::timeout(wait, self.semaphore.clone().acquire_owned())
                .await
                .ok()
                .and_then(|r| r.ok()),
        };

        permit.ok_or_else(|| {
            tracing::warn!(
                category = %self.category,
                max_concurrent = self.max_concurrent,
                "Bulkhead full, rejecting call"
            );
            ResilienceError::BulkheadFull {
                category: self.category,
                max_concurrent: self.max_concurrent,
            }
        })
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn category(&self) -> ResourceCategory {
        self.category
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max: usize, wait_ms: Option<u64>) -> BulkheadConfig {
        BulkheadConfig {
            max_concurrent_calls: max,
            max_wait_ms: wait_ms,
        }
    }

    #[tokio::test]
    async fn rejects_immediately_when_full() {
        let bulkhead = Bulkhead::new(ResourceCategory::ToolExecution, &config(1, None));
        let held = bulkhead.acquire().await.unwrap();
        assert_eq!(bulkhead.available_permits(), 0);

        let err = bulkhead.acquire().await.unwrap_err();
        assert_eq!(
            err,
            ResilienceError::BulkheadFull {
                category: ResourceCategory::ToolExecution,
                max_concurrent: 1
            }
        );

        drop(held);
        assert!(bulkhead.acquire().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_wait_gets_released_permit() {
        let bulkhead = Arc::new(Bulkhead::new(
            ResourceCategory::Memory,
            &config(1, Some(200)),
        ));
        let held = bulkhead.acquire().await.unwrap();

        let waiter = {
            let bulkhead = bulkhead.clone();
            tokio::spawn(async move { bulkhead.acquire().await.is_ok() })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(held);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_wait_times_out() {
        let bulkhead = Bulkhead::new(ResourceCategory::Memory, &config(1, Some(100)));
        let _held = bulkhead.acquire().await.unwrap();
        assert!(bulkhead.acquire().await.is_err());
    }
}
