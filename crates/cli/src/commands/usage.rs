//! `ferroact usage`: token limits, budgets and usage reports.
//!
//! Budgets live in process memory, so outside an interactive session this
//! shows configured limits and a fresh budget. Inside `ferroact agent`,
//! `/usage` reports on the live session.

use ferroact_config::AppConfig;
use ferroact_telemetry::TokenMonitor;

pub fn run(config: AppConfig, user: &str) -> anyhow::Result<()> {
    let monitor = TokenMonitor::from_config(&config.tokens);

    println!("Token Limits");
    println!("─────────────────────────────────────");
    println!("  Per minute:   {}", config.tokens.per_minute);
    println!("  Per hour:     {}", config.tokens.per_hour);
    println!("  Per day:      {}", config.tokens.per_day);
    println!("  Retention:    {} days", config.tokens.retention_days);
    println!();

    print_budget(&monitor, user)
}

/// Budget and last-day usage for one key.
pub fn print_budget(monitor: &TokenMonitor, key: &str) -> anyhow::Result<()> {
    let budget = monitor.get_token_budget(key);

    println!("Budget for '{key}'");
    println!("─────────────────────────────────────");
    for counter in budget.counters() {
        let pct = if counter.limit > 0 {
            (counter.consumed as f64 / counter.limit as f64 * 100.0).min(100.0)
        } else {
            0.0
        };
        println!(
            "  {:<12} {:>9} / {:<9} ({pct:.1}%)",
            counter.window.to_string(),
            counter.consumed,
            counter.limit
        );
    }
    println!("  Remaining:   {}", budget.remaining());

    let to = chrono::Utc::now();
    let report = monitor.generate_usage_report(key, to - chrono::Duration::days(1), to)?;
    println!();
    println!(
        "  Last 24h:    {} tokens in {} request(s) ({} in / {} out)",
        report.total_tokens(),
        report.requests,
        report.total_input_tokens,
        report.total_output_tokens
    );
    for conv in &report.by_conversation {
        println!(
            "    {:<38} {:>7} tokens, {} request(s)",
            conv.conversation_id,
            conv.input_tokens + conv.output_tokens,
            conv.requests
        );
    }
    Ok(())
}
