//! Provider selection, failover and health.
//!
//! Providers are tried in ascending priority. Each one is called through
//! its own LLM-provider pipeline (bulkhead, breaker, retry, time limiter),
//! so an open breaker on one provider leaves the others untouched.

use chrono::Utc;
use ferroact_config::AppConfig;
use ferroact_core::ResourceCategory;
use ferroact_core::error::{Error, ProviderError};
use ferroact_core::provider::{HealthStatus, LlmRequest, LlmResponse, Provider, ProviderHealth};
use ferroact_core::settings::ConfigSource;
use ferroact_resilience::{CallError, CircuitState, DegradationService, ResilienceRegistry};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::http::HttpProvider;

struct ProviderEntry {
    id: String,
    priority: u32,
    provider: Arc<dyn Provider>,
}

pub struct ProviderManager {
    entries: Vec<ProviderEntry>,
    health: RwLock<HashMap<String, ProviderHealth>>,
    registry: Arc<ResilienceRegistry>,
    degradation: Arc<DegradationService>,
}

impl ProviderManager {
    /// `providers` pairs each provider with its priority (lower is tried first).
    ///
    /// An empty list is a configuration error.
    pub fn new(
        providers: Vec<(Arc<dyn Provider>, u32)>,
        registry: Arc<ResilienceRegistry>,
        degradation: Arc<DegradationService>,
    ) -> Result<Self, Error> {
        if providers.is_empty() {
            return Err(Error::Config {
                message: "at least one LLM provider must be configured".into(),
            });
        }

        let mut entries: Vec<ProviderEntry> = providers
            .into_iter()
            .map(|(provider, priority)| ProviderEntry {
                id: provider.name().to_string(),
                priority,
                provider,
            })
            .collect();
        entries.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));

        for window in entries.windows(2) {
            if window[0].id == window[1].id {
                return Err(Error::Config {
                    message: format!("provider '{}' is registered twice", window[0].id),
                });
            }
        }

        info!(
            providers = ?entries.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            "Provider manager ready"
        );

        Ok(Self {
            entries,
            health: RwLock::new(HashMap::new()),
            registry,
            degradation,
        })
    }

    /// Build HTTP providers for every enabled `[providers.<id>]` section.
    pub fn from_config(
        config: &AppConfig,
        secrets: &dyn ConfigSource,
        registry: Arc<ResilienceRegistry>,
        degradation: Arc<DegradationService>,
    ) -> Result<Self, Error> {
        let mut providers: Vec<(Arc<dyn Provider>, u32)> = Vec::new();
        for (id, section) in config.enabled_providers() {
            let api_key = secrets.get_secret(&ferroact_config::env_key_for(id));
            let provider = HttpProvider::from_config(id, section, api_key)?;
            providers.push((Arc::new(provider), section.priority));
        }
        Self::new(providers, registry, degradation)
    }

    /// All registered provider ids in priority order.
    pub fn provider_ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    /// Providers currently eligible for selection, in priority order.
    pub fn get_available_providers(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| !self.marked_unhealthy(&e.id))
            .filter(|e| self.breaker_state(&e.id) != CircuitState::Open)
            .map(|e| e.id.clone())
            .collect()
    }

    /// Last recorded health, without probing.
    pub fn last_health(&self, provider_id: &str) -> Option<ProviderHealth> {
        self.health.read().get(provider_id).cloned()
    }

    // ── Generation ──

    /// Generate with failover. Returns [`ProviderError::Exhausted`] when no
    /// candidate produced a response.
    pub async fn try_generate(
        &self,
        request: &LlmRequest,
        provider_id: Option<&str>,
    ) -> Result<LlmResponse, ProviderError> {
        let candidates: Vec<&ProviderEntry> = match provider_id {
            Some(id) => {
                let entry = self
                    .entries
                    .iter()
                    .find(|e| e.id == id)
                    .ok_or_else(|| ProviderError::NotConfigured(format!("unknown provider '{id}'")))?;
                vec![entry]
            }
            None => self
                .entries
                .iter()
                .filter(|e| {
                    if self.marked_unhealthy(&e.id) {
                        debug!(provider = %e.id, "Skipping unhealthy provider");
                        return false;
                    }
                    e.provider.supports_model(&request.model)
                })
                .collect(),
        };

        let mut attempted = Vec::new();
        let mut last_error = ProviderError::NotConfigured(format!(
            "no provider available for model '{}'",
            request.model
        ));

        for entry in candidates {
            attempted.push(entry.id.clone());
            match self.call(entry, request).await {
                Ok(response) => {
                    if let Some(input) = request.last_user_message() {
                        self.degradation.cache_response(input, &response.content);
                    }
                    return Ok(response);
                }
                Err(e) => {
                    warn!(provider = %entry.id, error = %e, "Provider failed, trying next");
                    last_error = e;
                }
            }
        }

        Err(ProviderError::Exhausted {
            attempted,
            last_error: last_error.to_string(),
        })
    }

    /// Like [`try_generate`](Self::try_generate), answering from the
    /// degradation layer when every provider fails.
    pub async fn generate_response(&self, request: &LlmRequest, provider_id: Option<&str>) -> LlmResponse {
        match self.try_generate(request, provider_id).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "All providers failed, serving fallback");
                self.degradation.fallback_llm_response(request)
            }
        }
    }

    async fn call(&self, entry: &ProviderEntry, request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
        let pipeline = self.registry.pipeline_for(ResourceCategory::LlmProvider, &entry.id);
        let outcome = pipeline
            .execute(|| {
                let provider = Arc::clone(&entry.provider);
                let request = request.clone();
                async move { provider.generate(request).await }
            })
            .await;

        match outcome {
            Ok(response) => {
                debug!(provider = %entry.id, tokens = response.usage.total(), "Provider responded");
                self.record_health(ProviderHealth::new(&entry.id, HealthStatus::Healthy));
                Ok(response)
            }
            Err(err) => {
                if pipeline.breaker().state() == CircuitState::Open {
                    self.record_health(
                        ProviderHealth::new(&entry.id, HealthStatus::Unhealthy)
                            .with_detail("circuit breaker is open"),
                    );
                }
                Err(match err {
                    CallError::Rejected(rejection) => ProviderError::Rejected(rejection),
                    CallError::Failed(e) => e,
                })
            }
        }
    }

    // ── Health ──

    /// Breaker OPEN is unhealthy and HALF_OPEN degraded. Otherwise the
    /// provider's own probe decides.
    pub async fn check_provider_health(&self, provider_id: &str) -> ProviderHealth {
        let Some(entry) = self.entries.iter().find(|e| e.id == provider_id) else {
            return ProviderHealth::new(provider_id, HealthStatus::Unhealthy)
                .with_detail("provider is not registered");
        };

        let health = match self.breaker_health(provider_id) {
            Some(health) => health,
            None => match entry.provider.health_check().await {
                Ok(true) => ProviderHealth::new(provider_id, HealthStatus::Healthy),
                Ok(false) => ProviderHealth::new(provider_id, HealthStatus::Unhealthy)
                    .with_detail("health probe failed"),
                Err(e) => ProviderHealth::new(provider_id, HealthStatus::Unhealthy).with_detail(e.to_string()),
            },
        };

        self.record_health(health.clone());
        health
    }

    /// Probe every provider, in priority order.
    pub async fn refresh_health(&self) -> Vec<ProviderHealth> {
        let mut results = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            results.push(self.check_provider_health(&entry.id).await);
        }
        results
    }

    fn record_health(&self, health: ProviderHealth) {
        let mut map = self.health.write();
        let changed = map.get(&health.provider_id).map(|h| h.status) != Some(health.status);
        if changed {
            info!(provider = %health.provider_id, status = %health.status, "Provider health changed");
        }
        map.insert(health.provider_id.clone(), health);
    }

    /// Health implied by the breaker alone. `None` while it is closed.
    pub fn breaker_health(&self, provider_id: &str) -> Option<ProviderHealth> {
        match self.breaker_state(provider_id) {
            CircuitState::Open => Some(
                ProviderHealth::new(provider_id, HealthStatus::Unhealthy)
                    .with_detail("circuit breaker is open"),
            ),
            CircuitState::HalfOpen => Some(
                ProviderHealth::new(provider_id, HealthStatus::Degraded)
                    .with_detail("circuit breaker is half-open"),
            ),
            CircuitState::Closed => None,
        }
    }

    fn breaker_state(&self, provider_id: &str) -> CircuitState {
        self.registry
            .breaker(ResourceCategory::LlmProvider, provider_id)
            .state()
    }

    /// An UNHEALTHY mark holds for the breaker's open wait, after which the
    /// provider becomes a candidate again.
    fn marked_unhealthy(&self, provider_id: &str) -> bool {
        let wait = self
            .registry
            .config()
            .for_category(ResourceCategory::LlmProvider)
            .circuit_breaker
            .wait_duration_in_open();
        let Ok(wait) = chrono::Duration::from_std(wait) else {
            return false;
        };

        self.health.read().get(provider_id).is_some_and(|h| {
            h.status == HealthStatus::Unhealthy && Utc::now() - h.last_checked < wait
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ferroact_config::{ProviderConfig, ResilienceConfig};
    use ferroact_core::provider::Usage;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedProvider {
        id: String,
        fail_with: Option<ProviderError>,
        models: Vec<String>,
        healthy: bool,
        calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn ok(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.into(),
                fail_with: None,
                models: Vec::new(),
                healthy: true,
                calls: AtomicU32::new(0),
            })
        }

        fn failing(id: &str, error: ProviderError) -> Arc<Self> {
            Arc::new(Self {
                id: id.into(),
                fail_with: Some(error),
                models: Vec::new(),
                healthy: false,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            &self.id
        }

        fn supports_model(&self, model: &str) -> bool {
            self.models.is_empty() || self.models.iter().any(|m| m == model)
        }

        async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.fail_with {
                Some(e) => Err(e.clone()),
                None => Ok(LlmResponse::new(
                    format!("{} says hi", self.id),
                    &self.id,
                    &request.model,
                    Usage::new(10, 5),
                )),
            }
        }

        async fn health_check(&self) -> Result<bool, ProviderError> {
            Ok(self.healthy)
        }
    }

    fn auth_error() -> ProviderError {
        ProviderError::AuthenticationFailed("bad key".into())
    }

    fn entry(provider: Arc<ScriptedProvider>, priority: u32) -> (Arc<dyn Provider>, u32) {
        (provider, priority)
    }

    fn manager(providers: Vec<(Arc<dyn Provider>, u32)>) -> (ProviderManager, Arc<ResilienceRegistry>) {
        let registry = Arc::new(ResilienceRegistry::new(ResilienceConfig::default()));
        let degradation = Arc::new(DegradationService::new(registry.clone()));
        let manager = ProviderManager::new(providers, registry.clone(), degradation).unwrap();
        (manager, registry)
    }

    #[test]
    fn empty_provider_list_is_fatal() {
        let registry = Arc::new(ResilienceRegistry::default());
        let degradation = Arc::new(DegradationService::new(registry.clone()));
        let err = ProviderManager::new(Vec::new(), registry, degradation).err().unwrap();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn providers_ordered_by_priority() {
        let (manager, _) = manager(vec![
            entry(ScriptedProvider::ok("slow"), 20),
            entry(ScriptedProvider::ok("fast"), 1),
            entry(ScriptedProvider::ok("mid"), 10),
        ]);
        assert_eq!(manager.provider_ids(), vec!["fast", "mid", "slow"]);
        assert_eq!(manager.get_available_providers(), vec!["fast", "mid", "slow"]);
    }

    #[tokio::test]
    async fn fails_over_to_next_provider() {
        let primary = ScriptedProvider::failing("primary", auth_error());
        let backup = ScriptedProvider::ok("backup");
        let (manager, _) = manager(vec![entry(primary.clone(), 1), entry(backup.clone(), 2)]);

        let response = manager
            .try_generate(&LlmRequest::from_prompt("m", "hello"), None)
            .await
            .unwrap();
        assert_eq!(response.provider_id, "backup");
        assert_eq!(primary.calls(), 1);
        assert_eq!(backup.calls(), 1);
    }

    #[tokio::test]
    async fn exhaustion_lists_attempts() {
        let (manager, _) = manager(vec![
            entry(ScriptedProvider::failing("a", auth_error()), 1),
            entry(ScriptedProvider::failing("b", auth_error()), 2),
        ]);

        let err = manager
            .try_generate(&LlmRequest::from_prompt("m", "hello"), None)
            .await
            .unwrap_err();
        match err {
            ProviderError::Exhausted { attempted, last_error } => {
                assert_eq!(attempted, vec!["a", "b"]);
                assert!(last_error.contains("bad key"));
            }
            other => panic!("expected exhaustion, got {other}"),
        }
    }

    #[tokio::test]
    async fn generate_response_falls_back_and_uses_cache() {
        let healthy = ScriptedProvider::ok("solo");
        let (manager, registry) = manager(vec![entry(healthy, 1)]);
        let request = LlmRequest::from_prompt("m", "cached question");

        let live = manager.generate_response(&request, None).await;
        assert!(!live.from_fallback);

        let breaker = registry.breaker(ResourceCategory::LlmProvider, "solo");
        for _ in 0..10 {
            breaker.on_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let served = manager.generate_response(&request, None).await;
        assert!(served.from_fallback);
        assert_eq!(served.content, "solo says hi");
    }

    #[tokio::test]
    async fn unsupported_models_are_skipped() {
        let narrow = Arc::new(ScriptedProvider {
            id: "narrow".into(),
            fail_with: None,
            models: vec!["only-this".into()],
            healthy: true,
            calls: AtomicU32::new(0),
        });
        let wide = ScriptedProvider::ok("wide");
        let (manager, _) = manager(vec![entry(narrow.clone(), 1), entry(wide, 2)]);

        let response = manager
            .try_generate(&LlmRequest::from_prompt("other-model", "hi"), None)
            .await
            .unwrap();
        assert_eq!(response.provider_id, "wide");
        assert_eq!(narrow.calls(), 0);
    }

    #[tokio::test]
    async fn explicit_provider_is_used() {
        let (manager, _) = manager(vec![
            entry(ScriptedProvider::ok("a"), 1),
            entry(ScriptedProvider::ok("b"), 2),
        ]);
        let response = manager
            .try_generate(&LlmRequest::from_prompt("m", "hi"), Some("b"))
            .await
            .unwrap();
        assert_eq!(response.provider_id, "b");

        let err = manager
            .try_generate(&LlmRequest::from_prompt("m", "hi"), Some("zzz"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn unhealthy_providers_are_skipped() {
        let sick = ScriptedProvider::failing("sick", auth_error());
        let fine = ScriptedProvider::ok("fine");
        let (manager, _) = manager(vec![entry(sick.clone(), 1), entry(fine, 2)]);

        let health = manager.refresh_health().await;
        assert_eq!(health[0].status, HealthStatus::Unhealthy);
        assert_eq!(health[1].status, HealthStatus::Healthy);
        assert_eq!(manager.get_available_providers(), vec!["fine"]);

        manager
            .try_generate(&LlmRequest::from_prompt("m", "hi"), None)
            .await
            .unwrap();
        assert_eq!(sick.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn health_follows_breaker_state() {
        let (manager, registry) = manager(vec![entry(ScriptedProvider::ok("p"), 1)]);
        assert_eq!(manager.check_provider_health("p").await.status, HealthStatus::Healthy);

        let breaker = registry.breaker(ResourceCategory::LlmProvider, "p");
        for _ in 0..10 {
            breaker.on_failure();
        }
        assert_eq!(manager.check_provider_health("p").await.status, HealthStatus::Unhealthy);

        tokio::time::advance(std::time::Duration::from_secs(31)).await;
        let _trial = breaker.try_acquire().unwrap();
        assert_eq!(manager.check_provider_health("p").await.status, HealthStatus::Degraded);

        let unknown = manager.check_provider_health("ghost").await;
        assert_eq!(unknown.status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn retryable_failures_are_retried_on_same_provider() {
        let mut config = ResilienceConfig::default();
        config.llm_provider.retry.initial_delay_ms = 1;
        let registry = Arc::new(ResilienceRegistry::new(config));
        let degradation = Arc::new(DegradationService::new(registry.clone()));
        let flaky = ScriptedProvider::failing("flaky", ProviderError::Network("reset".into()));
        let manager =
            ProviderManager::new(vec![entry(flaky.clone(), 1)], registry, degradation).unwrap();

        let err = manager
            .try_generate(&LlmRequest::from_prompt("m", "hi"), None)
            .await
            .unwrap_err();
        assert_eq!(flaky.calls(), 3);
        assert!(err.to_string().contains("after 3 attempt(s)"));
    }

    #[test]
    fn builds_from_config() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "primary".into(),
            ProviderConfig {
                api_key: Some("k1".into()),
                api_url: "http://localhost:9000/generate".into(),
                priority: 1,
                models: Vec::new(),
                enabled: true,
            },
        );
        config.providers.insert(
            "disabled".into(),
            ProviderConfig {
                api_key: None,
                api_url: "http://localhost:9001/generate".into(),
                priority: 0,
                models: Vec::new(),
                enabled: false,
            },
        );
        let registry = Arc::new(ResilienceRegistry::default());
        let degradation = Arc::new(DegradationService::new(registry.clone()));
        let manager = ProviderManager::from_config(&config, &config, registry, degradation).unwrap();
        assert_eq!(manager.provider_ids(), vec!["primary"]);
    }
}
