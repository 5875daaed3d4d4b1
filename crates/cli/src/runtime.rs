//! Wiring: builds the engine and its collaborators from configuration.

use anyhow::Context;
use ferroact_agent::{EngineConfig, ReactEngine};
use ferroact_config::AppConfig;
use ferroact_core::event::EventBus;
use ferroact_memory::InMemoryStore;
use ferroact_providers::ProviderManager;
use ferroact_resilience::{DegradationService, ResilienceRegistry};
use ferroact_telemetry::TokenMonitor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Everything a command needs, sharing one resilience registry.
pub struct Runtime {
    pub config: AppConfig,
    pub registry: Arc<ResilienceRegistry>,
    pub degradation: Arc<DegradationService>,
    pub engine: Arc<ReactEngine>,
}

impl Runtime {
    pub fn build(config: AppConfig) -> anyhow::Result<Self> {
        let registry = Arc::new(ResilienceRegistry::new(config.resilience.clone()));
        let degradation = Arc::new(
            DegradationService::new(Arc::clone(&registry)).with_ttl(config.fallback.cache_ttl()),
        );
        let events = Arc::new(EventBus::default());

        let providers = ProviderManager::from_config(
            &config,
            &config,
            Arc::clone(&registry),
            Arc::clone(&degradation),
        )
        .with_context(|| {
            format!(
                "no usable LLM provider; add a [providers.<id>] section to {}",
                AppConfig::config_dir().join("config.toml").display()
            )
        })?;

        let tools = ferroact_tools::default_executor(Arc::clone(&registry), &config.tools)
            .context("failed to set up the file tools")?
            .with_degradation(Arc::clone(&degradation))
            .with_events(Arc::clone(&events));

        let monitor = TokenMonitor::from_config(&config.tokens);
        let memory = InMemoryStore::with_ttl(Duration::from_secs(config.memory.ttl_secs));

        let engine = ReactEngine::new(
            Arc::new(providers),
            Arc::new(tools),
            Arc::new(monitor),
            Arc::clone(&degradation),
            EngineConfig::from_config(&config),
        )
        .with_memory(Arc::new(memory))
        .with_events(events);

        Ok(Self {
            config,
            registry,
            degradation,
            engine: Arc::new(engine),
        })
    }
}

/// Load from `path`, or from the default location, applying environment
/// overrides either way.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => {
            let mut config = AppConfig::load_from(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            config.apply_env_overrides(|key| std::env::var(key).ok());
            config.validate()?;
            config
        }
        None => AppConfig::load().context("failed to load config")?,
    };
    Ok(config)
}
