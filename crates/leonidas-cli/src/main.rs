//! Leonidas CLI — entry point.
//!
//! # Commands
//!
//! - `leonidas gateway [--logs]` — run the Discord bot
//! - `leonidas onboard` — write a default config
//! - `leonidas status` — show configuration and env-file state
//! - `leonidas env show|undo` — inspect or roll back credential records
//! - `leonidas query <payload>` — POST a JSON payload with the query helper

mod env_cmd;
mod gateway;
mod helpers;
mod onboard;
mod status;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use leonidas_bot::QueryClient;
use leonidas_core::config::load_config;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// Leonidas — Discord commands for a containerized agent
#[derive(Parser)]
#[command(name = "leonidas", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Discord gateway and command dispatcher
    Gateway {
        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Initialize configuration
    Onboard,

    /// Show configuration and env-file status
    Status,

    /// Inspect or edit the agent env file
    Env {
        #[command(subcommand)]
        action: env_cmd::EnvCommands,
    },

    /// POST a JSON payload and print the JSON reply
    Query {
        /// JSON request body
        payload: String,

        /// Endpoint (defaults to `query.apiUrl` from the config)
        #[arg(short, long)]
        url: Option<String>,
    },
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    // Legacy deployments keep DISCORD_BOT_SECRET / API_KEY in ./.env
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Gateway { logs } => {
            init_logging(logs);
            gateway::run().await
        }
        Commands::Onboard => onboard::run(),
        Commands::Status => status::run().await,
        Commands::Env { action } => {
            init_logging(false);
            env_cmd::dispatch(action).await
        }
        Commands::Query { payload, url } => {
            init_logging(false);
            run_query(&payload, url.as_deref()).await
        }
    }
}

async fn run_query(payload: &str, url: Option<&str>) -> Result<()> {
    let payload: serde_json::Value =
        serde_json::from_str(payload).context("payload is not valid JSON")?;
    let config = load_config(None);
    let client = QueryClient::from_config(&config.query);

    let result = match url {
        Some(url) => client.query(url, &payload).await,
        None => client.query_default(&payload).await,
    };
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("leonidas=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_env_undo() {
        let cli = Cli::try_parse_from(["leonidas", "env", "undo"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Env {
                action: env_cmd::EnvCommands::Undo { .. }
            }
        ));
    }

    #[test]
    fn parses_gateway_logs() {
        let cli = Cli::try_parse_from(["leonidas", "gateway", "--logs"]).unwrap();
        assert!(matches!(cli.command, Commands::Gateway { logs: true }));
    }

    #[tokio::test]
    async fn query_rejects_invalid_json() {
        assert!(run_query("{not json", Some("http://127.0.0.1:1")).await.is_err());
    }
}
