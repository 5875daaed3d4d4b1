//! `ferroact doctor`: diagnose configuration and provider reachability.

use crate::runtime::{self, Runtime};
use ferroact_config::AppConfig;
use ferroact_core::provider::HealthStatus;
use ferroact_core::settings::ConfigSource;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    println!("FerroAct Doctor");
    println!("===============\n");

    let mut issues = 0;

    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
    if path.exists() {
        println!("  ok    Config file found at {}", path.display());
    } else {
        println!("  warn  No config file at {} (using defaults)", path.display());
        issues += 1;
    }

    let config = match runtime::load_config(config_path) {
        Ok(config) => {
            println!("  ok    Config is valid");
            config
        }
        Err(e) => {
            println!("  fail  Config is invalid: {e:#}");
            println!("\n  1 blocking issue found.");
            return Ok(());
        }
    };

    let providers = config.enabled_providers();
    if providers.is_empty() {
        println!("  fail  No enabled providers; add a [providers.<id>] section");
        issues += 1;
    }
    for (id, _) in &providers {
        let key = ferroact_config::env_key_for(id);
        if config.get_secret(&key).is_some() {
            println!("  ok    Provider '{id}' has an API key");
        } else {
            println!("  warn  Provider '{id}' has no API key (set {key} or api_key)");
            issues += 1;
        }
    }

    if let Some(root) = &config.tools.file_root {
        if root.is_dir() {
            println!("  ok    File tool root {} exists", root.display());
        } else {
            println!("  fail  File tool root {} is not a directory", root.display());
            issues += 1;
        }
    }

    if !providers.is_empty() {
        match Runtime::build(config) {
            Ok(runtime) => {
                for health in runtime.engine.providers().refresh_health().await {
                    match health.status {
                        HealthStatus::Healthy => println!("  ok    Provider '{}' is reachable", health.provider_id),
                        status => {
                            println!(
                                "  warn  Provider '{}' is {status}: {}",
                                health.provider_id,
                                health.detail.as_deref().unwrap_or("no detail")
                            );
                            issues += 1;
                        }
                    }
                }
            }
            Err(e) => {
                println!("  fail  Could not build the runtime: {e:#}");
                issues += 1;
            }
        }
    }

    println!();
    if issues == 0 {
        println!("  All checks passed!");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
