//! FerroAct CLI, the main entry point.
//!
//! Commands:
//! - `agent`     : interactive chat or single-message mode
//! - `status`    : system status, degradation and circuit states
//! - `providers` : health of every configured provider
//! - `usage`     : token limits, budgets and usage
//! - `doctor`    : diagnose configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "ferroact",
    about = "FerroAct: a resilient ReAct agent engine",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of ~/.ferroact/config.toml
    #[arg(short, long, global = true, env = "FERROACT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent
    Agent {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Continue an existing conversation id
        #[arg(long)]
        conversation: Option<String>,

        /// Charge token usage to this user
        #[arg(short, long)]
        user: Option<String>,

        /// Print thoughts, actions and observations as they happen
        #[arg(short, long)]
        trace: bool,
    },

    /// Show system status and circuit breaker states
    Status,

    /// Show the health of each configured provider
    Providers {
        /// Report breaker-derived health only, without probing endpoints
        #[arg(long)]
        no_probe: bool,
    },

    /// Show token limits and the budget of a user
    Usage {
        /// Budget key to report on
        #[arg(short, long, default_value = "default")]
        user: String,
    },

    /// Diagnose configuration and provider reachability
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Agent {
            message,
            conversation,
            user,
            trace,
        } => {
            let config = runtime::load_config(config_path)?;
            commands::agent::run(config, message, conversation, user, trace).await?
        }
        Commands::Status => commands::status::run(runtime::load_config(config_path)?).await?,
        Commands::Providers { no_probe } => {
            commands::providers::run(runtime::load_config(config_path)?, !no_probe).await?
        }
        Commands::Usage { user } => commands::usage::run(runtime::load_config(config_path)?, &user)?,
        Commands::Doctor => commands::doctor::run(config_path).await?,
    }

    Ok(())
}
