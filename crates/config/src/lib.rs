//! Configuration loading, validation, and management for FerroAct.
//!
//! Loads configuration from `~/.ferroact/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use ferroact_core::category::ResourceCategory;
use ferroact_core::settings::ConfigSource;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod resilience;

pub use resilience::{
    BulkheadConfig, CategoryResilienceConfig, CircuitBreakerConfig, ResilienceConfig, RetryConfig,
    TimeLimiterConfig,
};

/// The root configuration structure.
///
/// Maps directly to `~/.ferroact/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key shared by providers that do not set their own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Reasoning loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Per-category bulkhead, breaker, retry and time-limit settings
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Token budgets
    #[serde(default)]
    pub tokens: TokenConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub fallback: FallbackConfig,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("agent", &self.agent)
            .field("providers", &self.providers)
            .field("resilience", &self.resilience)
            .field("tokens", &self.tokens)
            .field("tools", &self.tools)
            .field("memory", &self.memory)
            .field("fallback", &self.fallback)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("priority", &self.priority)
            .field("models", &self.models)
            .field("enabled", &self.enabled)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Safety limit on think/act/observe iterations per message
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Replaces the built-in system prompt when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Deadline for the whole loop of one message, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_timeout_secs: Option<u64>,
}

fn default_max_iterations() -> u32 {
    10
}

impl AgentConfig {
    pub fn conversation_timeout(&self) -> Option<Duration> {
        self.conversation_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            system_prompt: None,
            conversation_timeout_secs: None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    pub api_url: String,

    /// Lower is tried first
    #[serde(default = "default_priority")]
    pub priority: u32,

    /// Models this provider serves. Empty = any model.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_priority() -> u32 {
    100
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    #[serde(default = "default_per_minute")]
    pub per_minute: u64,

    #[serde(default = "default_per_hour")]
    pub per_hour: u64,

    #[serde(default = "default_per_day")]
    pub per_day: u64,

    /// How long usage records are kept for reports
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_per_minute() -> u64 {
    10_000
}
fn default_per_hour() -> u64 {
    100_000
}
fn default_per_day() -> u64 {
    1_000_000
}
fn default_retention_days() -> u32 {
    30
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            per_minute: default_per_minute(),
            per_hour: default_per_hour(),
            per_day: default_per_day(),
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Applied when neither registration nor the tool declares a timeout
    #[serde(default = "default_tool_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Per-tool overrides, keyed by tool name
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub timeouts: HashMap<String, u64>,

    /// Directory the filesystem tools are confined to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_root: Option<PathBuf>,
}

fn default_tool_timeout_ms() -> u64 {
    30_000
}

impl ToolsConfig {
    pub fn timeout_for(&self, tool_name: &str) -> Option<Duration> {
        self.timeouts.get(tool_name).copied().map(Duration::from_millis)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_tool_timeout_ms(),
            timeouts: HashMap::new(),
            file_root: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Age after which stored contexts are removed by cleanup
    #[serde(default = "default_memory_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_memory_ttl_secs() -> u64 {
    86_400
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_memory_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

impl FallbackConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.ferroact/config.toml).
    ///
    /// Environment overrides:
    /// - `FERROACT_API_KEY` (shared key, when the file sets none)
    /// - `FERROACT_MODEL`
    /// - `<PROVIDER_ID>_API_KEY` for each configured provider
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through a lookup function.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("FERROACT_API_KEY");
        }

        if let Some(model) = lookup("FERROACT_MODEL") {
            self.default_model = model;
        }

        for (id, provider) in self.providers.iter_mut() {
            if provider.api_key.is_none() {
                provider.api_key = lookup(&env_key_for(id));
            }
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ferroact")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be > 0".into(),
            ));
        }

        for (id, provider) in &self.providers {
            if provider.enabled && provider.api_url.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "providers.{id}.api_url must not be empty"
                )));
            }
        }

        if self.tokens.per_minute == 0 || self.tokens.per_hour == 0 || self.tokens.per_day == 0 {
            return Err(ConfigError::ValidationError(
                "token limits must be > 0".into(),
            ));
        }

        if self.tools.default_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "tools.default_timeout_ms must be > 0".into(),
            ));
        }

        for category in ResourceCategory::ALL {
            self.resilience
                .for_category(category)
                .validate()
                .map_err(|reason| {
                    ConfigError::ValidationError(format!("resilience.{category}: {reason}"))
                })?;
        }

        Ok(())
    }

    /// Enabled providers, lowest priority value first.
    pub fn enabled_providers(&self) -> Vec<(&String, &ProviderConfig)> {
        let mut providers: Vec<_> = self.providers.iter().filter(|(_, p)| p.enabled).collect();
        providers.sort_by(|a, b| a.1.priority.cmp(&b.1.priority).then_with(|| a.0.cmp(b.0)));
        providers
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            agent: AgentConfig::default(),
            providers: HashMap::new(),
            resilience: ResilienceConfig::default(),
            tokens: TokenConfig::default(),
            tools: ToolsConfig::default(),
            memory: MemoryConfig::default(),
            fallback: FallbackConfig::default(),
        }
    }
}

/// `openai` → `OPENAI_API_KEY`, `local-llm` → `LOCAL_LLM_API_KEY`.
pub fn env_key_for(provider_id: &str) -> String {
    let id: String = provider_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("{id}_API_KEY")
}

impl ConfigSource for AppConfig {
    /// Environment first, then the key stored in the file.
    fn get_secret(&self, key: &str) -> Option<String> {
        if let Ok(value) = std::env::var(key) {
            return Some(value);
        }
        if key == "FERROACT_API_KEY" {
            return self.api_key.clone();
        }
        self.providers
            .iter()
            .find(|(id, _)| env_key_for(id) == key)
            .and_then(|(_, p)| p.api_key.clone().or_else(|| self.api_key.clone()))
    }

    /// Secrets (`api_key` leaves) are never returned here.
    fn get_config_value(&self, key: &str) -> Option<String> {
        if key.rsplit('.').next() == Some("api_key") {
            return None;
        }
        let root = serde_json::to_value(self).ok()?;
        let mut node = &root;
        for segment in key.split('.') {
            node = node.get(segment)?;
        }
        match node {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
default_model = "llama3"

[agent]
max_iterations = 6
conversation_timeout_secs = 120

[providers.primary]
api_url = "https://api.example.com/v1/generate"
api_key = "sk-primary"
priority = 1
models = ["llama3"]

[providers.backup]
api_url = "http://localhost:8080/generate"
priority = 2

[resilience.llm_provider.circuit_breaker]
failure_rate_threshold = 50.0
sliding_window_size = 4
minimum_calls = 3

[tools]
default_timeout_ms = 5000
[tools.timeouts]
web_search = 2000
"#;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.max_iterations, 10);
        assert_eq!(config.fallback.cache_ttl_secs, 3600);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_model, config.default_model);
        assert_eq!(parsed.tokens.per_day, config.tokens.per_day);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_iterations_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_model, "gpt-4o-mini");
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.default_model, "llama3");
        assert_eq!(config.agent.max_iterations, 6);
        assert_eq!(
            config.agent.conversation_timeout(),
            Some(Duration::from_secs(120))
        );
        assert_eq!(
            config.tools.timeout_for("web_search"),
            Some(Duration::from_millis(2000))
        );
        assert_eq!(config.tools.timeout_for("calculator"), None);

        let cb = &config
            .resilience
            .for_category(ResourceCategory::LlmProvider)
            .circuit_breaker;
        assert_eq!(cb.sliding_window_size, 4);
        assert_eq!(cb.minimum_calls, 3);

        let ids: Vec<_> = config.enabled_providers().into_iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(ids, vec!["primary", "backup"]);
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "default_model = [").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_fill_missing_keys() {
        let mut config: AppConfig = toml::from_str(SAMPLE).unwrap();
        let env = HashMap::from([
            ("FERROACT_MODEL".to_string(), "mistral".to_string()),
            ("BACKUP_API_KEY".to_string(), "sk-backup".to_string()),
            ("PRIMARY_API_KEY".to_string(), "ignored".to_string()),
        ]);
        config.apply_env_overrides(|k| env.get(k).cloned());

        assert_eq!(config.default_model, "mistral");
        assert_eq!(config.providers["backup"].api_key.as_deref(), Some("sk-backup"));
        // File value wins over env for keys already set
        assert_eq!(config.providers["primary"].api_key.as_deref(), Some("sk-primary"));
    }

    #[test]
    fn empty_provider_url_rejected() {
        let config: AppConfig = toml::from_str(
            r#"
[providers.broken]
api_url = ""
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_source_dotted_lookup() {
        let config: AppConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.get_config_value("agent.max_iterations").as_deref(), Some("6"));
        assert_eq!(config.get_config_value("default_model").as_deref(), Some("llama3"));
        assert_eq!(
            config.get_config_value("providers.primary.api_url").as_deref(),
            Some("https://api.example.com/v1/generate")
        );
        assert_eq!(config.get_config_value("providers.primary.api_key"), None);
        assert_eq!(config.get_config_value_or("agent.missing", "x"), "x");
    }

    #[test]
    fn config_source_secret_from_file() {
        let config: AppConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(
            config.get_secret("PRIMARY_API_KEY").as_deref(),
            Some("sk-primary")
        );
    }

    #[test]
    fn debug_redacts_keys() {
        let config: AppConfig = toml::from_str(SAMPLE).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-primary"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn env_key_naming() {
        assert_eq!(env_key_for("openai"), "OPENAI_API_KEY");
        assert_eq!(env_key_for("local-llm"), "LOCAL_LLM_API_KEY");
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gpt-4o-mini"));
        assert!(toml_str.contains("llm_provider"));
    }
}
