//! # FerroAct Resilience
//!
//! Every outbound call (provider, tool, memory, external service) passes
//! through a [`ResiliencePipeline`] built for its [`ResourceCategory`]:
//!
//! ```text
//! bulkhead → circuit breaker → retry → time limiter → work
//! ```
//!
//! Shared state (breakers, bulkhead permits) lives in a [`ResilienceRegistry`]
//! that is constructed once and injected. The [`DegradationService`] reads
//! breaker states from the same registry to derive system status and serve
//! fallback content.
//!
//! [`ResourceCategory`]: ferroact_core::ResourceCategory

pub mod bulkhead;
pub mod circuit_breaker;
pub mod degradation;
pub mod pipeline;
pub mod registry;
pub mod retry;
pub mod time_limiter;

pub use bulkhead::Bulkhead;
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use degradation::{CachedResponse, DegradationService, SystemStatus};
pub use pipeline::{CallError, ResiliencePipeline};
pub use registry::ResilienceRegistry;
pub use retry::{RetryPolicy, Retryable};
pub use time_limiter::TimeLimiter;
