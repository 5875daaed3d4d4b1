//! `ferroact providers`: health of each configured provider.

use crate::runtime::Runtime;
use ferroact_config::AppConfig;
use ferroact_core::provider::{HealthStatus, ProviderHealth};

pub async fn run(config: AppConfig, probe: bool) -> anyhow::Result<()> {
    let runtime = Runtime::build(config)?;
    let manager = runtime.engine.providers();

    let report: Vec<ProviderHealth> = if probe {
        manager.refresh_health().await
    } else {
        manager
            .provider_ids()
            .iter()
            .map(|id| {
                manager
                    .breaker_health(id)
                    .or_else(|| manager.last_health(id))
                    .unwrap_or_else(|| {
                        ProviderHealth::new(id, HealthStatus::Healthy).with_detail("not probed")
                    })
            })
            .collect()
    };

    println!("LLM Providers (priority order)");
    println!("==============================");
    for health in &report {
        let section = runtime.config.providers.get(&health.provider_id);
        let url = section.map(|s| s.api_url.as_str()).unwrap_or("-");
        let priority = section.map(|s| s.priority.to_string()).unwrap_or_default();
        println!(
            "  {:<16} {:>4}  {:<10} {}",
            health.provider_id, priority, health.status.to_string(), url
        );
        if let Some(detail) = &health.detail {
            println!("  {:<16}       {detail}", "");
        }
    }

    let available = manager.get_available_providers();
    println!();
    println!("  Available: {}", if available.is_empty() { "none".to_string() } else { available.join(", ") });

    Ok(())
}
