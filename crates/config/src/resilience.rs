//! `[resilience.<category>]` settings.
//!
//! Each category has its own defaults. A category table that is present in
//! the file replaces those defaults; sub-tables it leaves out fall back to
//! the generic values below.

use ferroact_core::category::ResourceCategory;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Percentage of failed calls in the window that opens the breaker
    #[serde(default = "default_failure_rate")]
    pub failure_rate_threshold: f64,

    /// Number of most recent outcomes kept
    #[serde(default = "default_window")]
    pub sliding_window_size: usize,

    /// Outcomes required before the failure rate is considered
    #[serde(default = "default_minimum_calls")]
    pub minimum_calls: usize,

    #[serde(default = "default_wait_open_ms")]
    pub wait_duration_in_open_ms: u64,

    #[serde(default = "default_half_open_calls")]
    pub permitted_calls_in_half_open: usize,
}

fn default_failure_rate() -> f64 {
    50.0
}
fn default_window() -> usize {
    10
}
fn default_minimum_calls() -> usize {
    5
}
fn default_wait_open_ms() -> u64 {
    30_000
}
fn default_half_open_calls() -> usize {
    3
}

impl CircuitBreakerConfig {
    pub fn wait_duration_in_open(&self) -> Duration {
        Duration::from_millis(self.wait_duration_in_open_ms)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: default_failure_rate(),
            sliding_window_size: default_window(),
            minimum_calls: default_minimum_calls(),
            wait_duration_in_open_ms: default_wait_open_ms(),
            permitted_calls_in_half_open: default_half_open_calls(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first call
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    500
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_max_delay_ms() -> u64 {
    10_000
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkheadConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_calls: usize,

    /// How long a caller may wait for a permit. Absent = reject immediately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_wait_ms: Option<u64>,
}

fn default_max_concurrent() -> usize {
    10
}

impl BulkheadConfig {
    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_ms.map(Duration::from_millis)
    }
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: default_max_concurrent(),
            max_wait_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeLimiterConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl TimeLimiterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for TimeLimiterConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// All four policies for one category.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryResilienceConfig {
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub bulkhead: BulkheadConfig,
    #[serde(default)]
    pub time_limiter: TimeLimiterConfig,
}

impl CategoryResilienceConfig {
    fn preset(
        (threshold, window, minimum, wait_ms, half_open): (f64, usize, usize, u64, usize),
        (attempts, initial_ms): (u32, u64),
        max_concurrent: usize,
        timeout_ms: u64,
    ) -> Self {
        Self {
            circuit_breaker: CircuitBreakerConfig {
                failure_rate_threshold: threshold,
                sliding_window_size: window,
                minimum_calls: minimum,
                wait_duration_in_open_ms: wait_ms,
                permitted_calls_in_half_open: half_open,
            },
            retry: RetryConfig {
                max_attempts: attempts,
                initial_delay_ms: initial_ms,
                ..RetryConfig::default()
            },
            bulkhead: BulkheadConfig {
                max_concurrent_calls: max_concurrent,
                max_wait_ms: None,
            },
            time_limiter: TimeLimiterConfig { timeout_ms },
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let cb = &self.circuit_breaker;
        if !(cb.failure_rate_threshold > 0.0 && cb.failure_rate_threshold <= 100.0) {
            return Err("circuit_breaker.failure_rate_threshold must be in (0, 100]".into());
        }
        if cb.sliding_window_size == 0 {
            return Err("circuit_breaker.sliding_window_size must be > 0".into());
        }
        if cb.minimum_calls == 0 || cb.minimum_calls > cb.sliding_window_size {
            return Err(
                "circuit_breaker.minimum_calls must be between 1 and sliding_window_size".into(),
            );
        }
        if cb.permitted_calls_in_half_open == 0 {
            return Err("circuit_breaker.permitted_calls_in_half_open must be > 0".into());
        }
        if self.retry.max_attempts == 0 {
            return Err("retry.max_attempts must be >= 1".into());
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err("retry.backoff_multiplier must be >= 1.0".into());
        }
        if self.bulkhead.max_concurrent_calls == 0 {
            return Err("bulkhead.max_concurrent_calls must be > 0".into());
        }
        if self.time_limiter.timeout_ms == 0 {
            return Err("time_limiter.timeout_ms must be > 0".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    #[serde(default = "llm_provider_defaults")]
    pub llm_provider: CategoryResilienceConfig,

    #[serde(default = "external_service_defaults")]
    pub external_service: CategoryResilienceConfig,

    #[serde(default = "database_defaults")]
    pub database: CategoryResilienceConfig,

    #[serde(default = "memory_defaults")]
    pub memory: CategoryResilienceConfig,

    #[serde(default = "tool_execution_defaults")]
    pub tool_execution: CategoryResilienceConfig,
}

fn llm_provider_defaults() -> CategoryResilienceConfig {
    CategoryResilienceConfig::preset((50.0, 10, 5, 30_000, 3), (3, 1_000), 10, 30_000)
}
fn external_service_defaults() -> CategoryResilienceConfig {
    CategoryResilienceConfig::preset((50.0, 10, 5, 60_000, 3), (3, 500), 20, 10_000)
}
fn database_defaults() -> CategoryResilienceConfig {
    CategoryResilienceConfig::preset((50.0, 20, 10, 10_000, 5), (3, 200), 25, 5_000)
}
fn memory_defaults() -> CategoryResilienceConfig {
    CategoryResilienceConfig::preset((50.0, 10, 5, 15_000, 3), (2, 100), 50, 3_000)
}
fn tool_execution_defaults() -> CategoryResilienceConfig {
    // Tool bodies are not retried: a retry could repeat side effects.
    CategoryResilienceConfig::preset((60.0, 10, 5, 20_000, 3), (1, 0), 10, 30_000)
}

impl ResilienceConfig {
    pub fn for_category(&self, category: ResourceCategory) -> &CategoryResilienceConfig {
        match category {
            ResourceCategory::LlmProvider => &self.llm_provider,
            ResourceCategory::ExternalService => &self.external_service,
            ResourceCategory::Database => &self.database,
            ResourceCategory::Memory => &self.memory,
            ResourceCategory::ToolExecution => &self.tool_execution,
        }
    }

    pub fn for_category_mut(&mut self, category: ResourceCategory) -> &mut CategoryResilienceConfig {
        match category {
            ResourceCategory::LlmProvider => &mut self.llm_provider,
            ResourceCategory::ExternalService => &mut self.external_service,
            ResourceCategory::Database => &mut self.database,
            ResourceCategory::Memory => &mut self.memory,
            ResourceCategory::ToolExecution => &mut self.tool_execution,
        }
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            llm_provider: llm_provider_defaults(),
            external_service: external_service_defaults(),
            database: database_defaults(),
            memory: memory_defaults(),
            tool_execution: tool_execution_defaults(),
        }
    }
}
