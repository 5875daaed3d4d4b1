//! Process-wide resilience state.
//!
//! One bulkhead per category. Breakers are keyed by category and instance,
//! so each LLM provider trips independently while other categories use a
//! single breaker named after the category.

use ferroact_config::ResilienceConfig;
use ferroact_core::ResourceCategory;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::bulkhead::Bulkhead;
use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::pipeline::ResiliencePipeline;
use crate::retry::RetryPolicy;
use crate::time_limiter::TimeLimiter;

pub struct ResilienceRegistry {
    config: ResilienceConfig,
    bulkheads: HashMap<ResourceCategory, Arc<Bulkhead>>,
    breakers: Mutex<HashMap<(ResourceCategory, String), Arc<CircuitBreaker>>>,
}

impl ResilienceRegistry {
    pub fn new(config: ResilienceConfig) -> Self {
        let bulkheads = ResourceCategory::ALL
            .into_iter()
            .map(|c| (c, Arc::new(Bulkhead::new(c, &config.for_category(c).bulkhead))))
            .collect();
        Self {
            config,
            bulkheads,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    pub fn bulkhead(&self, category: ResourceCategory) -> Arc<Bulkhead> {
        match self.bulkheads.get(&category) {
            Some(b) => b.clone(),
            // Every category is populated in new()
            None => Arc::new(Bulkhead::new(
                category,
                &self.config.for_category(category).bulkhead,
            )),
        }
    }

    /// Get or create the breaker for one instance of a category.
    pub fn breaker(&self, category: ResourceCategory, instance: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        breakers
            .entry((category, instance.to_string()))
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    category,
                    instance,
                    self.config.for_category(category).circuit_breaker.clone(),
                ))
            })
            .clone()
    }

    /// Pipeline using the category-wide breaker.
    pub fn pipeline(&self, category: ResourceCategory) -> ResiliencePipeline {
        self.pipeline_for(category, category.as_str())
    }

    /// Pipeline using the breaker of a named instance.
    pub fn pipeline_for(&self, category: ResourceCategory, instance: &str) -> ResiliencePipeline {
        let settings = self.config.for_category(category);
        ResiliencePipeline::new(
            category,
            self.bulkhead(category),
            self.breaker(category, instance),
            RetryPolicy::from_config(&settings.retry),
            TimeLimiter::new(category, &settings.time_limiter),
        )
    }

    /// All breakers created so far for a category.
    pub fn breakers_for(&self, category: ResourceCategory) -> Vec<Arc<CircuitBreaker>> {
        let breakers = self.breakers.lock();
        let mut found: Vec<_> = breakers
            .iter()
            .filter(|((c, _), _)| *c == category)
            .map(|(_, b)| b.clone())
            .collect();
        found.sort_by(|a, b| a.instance().cmp(b.instance()));
        found
    }

    /// Snapshot of every breaker: (category, instance, state).
    pub fn breaker_states(&self) -> Vec<(ResourceCategory, String, CircuitState)> {
        let breakers = self.breakers.lock();
        let mut states: Vec<_> = breakers
            .iter()
            .map(|((c, i), b)| (*c, i.clone(), b.state()))
            .collect();
        states.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
        states
    }
}

impl Default for ResilienceRegistry {
    fn default() -> Self {
        Self::new(ResilienceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakers_are_shared_per_instance() {
        let registry = ResilienceRegistry::default();
        let a = registry.breaker(ResourceCategory::LlmProvider, "openai");
        let b = registry.breaker(ResourceCategory::LlmProvider, "openai");
        let c = registry.breaker(ResourceCategory::LlmProvider, "local");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.breakers_for(ResourceCategory::LlmProvider).len(), 2);
    }

    #[test]
    fn categories_are_independent() {
        let registry = ResilienceRegistry::default();
        let db = registry.breaker(ResourceCategory::Database, "database");
        for _ in 0..20 {
            db.on_failure();
        }
        assert_eq!(db.state(), CircuitState::Open);

        let tools = registry.breaker(ResourceCategory::ToolExecution, "tool_execution");
        assert_eq!(tools.state(), CircuitState::Closed);
        assert!(tools.try_acquire().is_ok());
    }

    #[test]
    fn pipeline_uses_category_settings() {
        let registry = ResilienceRegistry::default();
        let p = registry.pipeline(ResourceCategory::Memory);
        assert_eq!(p.timeout(), registry.config().memory.time_limiter.timeout());
        assert_eq!(p.breaker().instance(), "memory");
    }

    #[test]
    fn states_snapshot_is_sorted() {
        let registry = ResilienceRegistry::default();
        registry.breaker(ResourceCategory::LlmProvider, "b");
        registry.breaker(ResourceCategory::LlmProvider, "a");
        let states = registry.breaker_states();
        assert_eq!(states[0].1, "a");
        assert_eq!(states[1].1, "b");
    }
}
