//! Gateway command — connects to Discord and serves slash commands.
//!
//! Startup sequence:
//! 1. Load config
//! 2. Create message bus
//! 3. Create REST client + Discord gateway channel
//! 4. Create launcher, env-file store, dispatcher
//! 5. Run: `tokio::select!` of dispatcher + gateway
//! 6. Handle Ctrl+C for graceful shutdown

use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::{info, warn};

use leonidas_bot::{BridgeSettings, ComposeLauncher, Dispatcher, COMMANDS};
use leonidas_channels::{Channel, DiscordChannel, DiscordRest};
use leonidas_core::bus::queue::MessageBus;
use leonidas_core::config::{get_config_path, load_config};
use leonidas_core::envfile::{EnvFileStore, SessionEnv};

use crate::helpers;

/// Run the gateway until Ctrl+C or a fatal gateway error.
pub async fn run() -> Result<()> {
    println!();
    helpers::print_banner();
    println!("  Mode: Gateway");
    println!();

    // 1. Load config
    let config = load_config(None);
    if !config.discord.is_configured() {
        bail!(
            "no Discord token configured; set discord.token in {} or DISCORD_BOT_SECRET",
            get_config_path().display()
        );
    }
    let dc = &config.discord;
    let agent = &config.agent;

    // 2. Create message bus
    let bus = Arc::new(MessageBus::new(100));

    // 3. REST + gateway
    let rest = DiscordRest::new(dc.token.clone());
    let commands = if dc.register_commands {
        COMMANDS.to_vec()
    } else {
        Vec::new()
    };
    let channel = Arc::new(
        DiscordChannel::new(
            dc.token.clone(),
            bus.clone(),
            rest.clone(),
            dc.allowed_users.clone(),
        )
        .with_commands(commands, dc.guild_id.clone()),
    );

    // 4. Launcher + env file
    let launcher = Arc::new(ComposeLauncher::new(agent));
    let store = Arc::new(EnvFileStore::new(agent.env_file_path()));

    // Seed the mirror with whatever record is already on disk
    let env = SessionEnv::new();
    match store.last_record().await {
        Ok(Some(record)) => env.apply(&record),
        Ok(None) => {}
        Err(e) => warn!(error = %e, path = %store.path().display(), "failed to read env file"),
    }

    let dispatcher = Dispatcher::new(
        bus.clone(),
        Arc::new(rest),
        launcher.clone(),
        store.clone(),
        BridgeSettings::from(agent),
    )
    .with_configure_timeout(agent.configure_timeout())
    .with_session_env(env);

    info!(
        project = %agent.project_path().display(),
        env_file = %store.path().display(),
        commands = dc.register_commands,
        "gateway starting"
    );

    println!("  Project:   {}", agent.project_path().display());
    println!("  Env file:  {}", store.path().display());
    println!("  Run:       {}", launcher.describe(&agent.run_args));
    println!(
        "  Commands:  {}",
        if dc.register_commands {
            COMMANDS.iter().map(|c| c.name).collect::<Vec<_>>().join(", ")
        } else {
            "(registration disabled)".to_string()
        }
    );
    if dc.allowed_users.is_empty() {
        println!("  Users:     everyone");
    } else {
        println!("  Users:     {} allowed", dc.allowed_users.len());
    }
    println!();
    println!("  Ctrl+C to stop");
    println!();

    // 5. Run dispatcher + gateway; Ctrl+C triggers graceful shutdown
    tokio::select! {
        _ = dispatcher.run() => {
            info!("dispatcher exited");
        }
        result = channel.start() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "discord gateway error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!();
            println!("  Shutting down...");
            info!("received Ctrl+C, shutting down");
            if let Err(e) = channel.stop().await {
                warn!(error = %e, "failed to stop discord gateway");
            }
        }
    }

    println!("  Gateway stopped. Goodbye!");
    Ok(())
}
