//! `ferroact status`: system status, degradation and circuit states.

use crate::runtime::Runtime;
use ferroact_config::AppConfig;

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let runtime = Runtime::build(config)?;

    println!("FerroAct Status");
    println!("===============");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Model:        {}", runtime.config.default_model);
    println!("  Temperature:  {}", runtime.config.default_temperature);
    println!("  Iterations:   {}", runtime.config.agent.max_iterations);
    match runtime.config.agent.conversation_timeout() {
        Some(deadline) => println!("  Deadline:     {}s per message", deadline.as_secs()),
        None => println!("  Deadline:     none"),
    }
    println!();
    print_status(&runtime);

    Ok(())
}

/// Degradation summary plus every breaker created so far.
pub fn print_status(runtime: &Runtime) {
    let status = runtime.degradation.system_status();
    let flag = |ok: bool| if ok { "operational" } else { "DOWN" };

    println!(
        "  System:       {} (degradation {:.0}%)",
        status.status_description(),
        status.degradation_level() * 100.0
    );
    println!("  LLM:          {}", flag(status.llm_providers_operational));
    println!("  External:     {}", flag(status.external_services_operational));
    println!("  Database:     {}", flag(status.database_operational));
    println!("  Tools:        {}", flag(status.tools_operational));
    println!("  Message:      {}", runtime.degradation.status_message());
    println!("  Cached:       {} response(s)", runtime.degradation.cache_len());

    let breakers = runtime.registry.breaker_states();
    println!();
    if breakers.is_empty() {
        println!("  Circuits:     none yet (created on first call)");
    } else {
        println!("  Circuits:");
        for (category, instance, state) in breakers {
            println!("    {:<18} {:<20} {state}", category.as_str(), instance);
        }
    }
}
