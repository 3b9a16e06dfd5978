//! `leonidas status` — show configuration and env-file state.

use anyhow::Result;
use colored::Colorize;

use leonidas_core::config::{get_config_path, load_config};
use leonidas_core::envfile::EnvFileStore;
use leonidas_core::utils::mask_secret;

use crate::helpers::presence;

/// Run the status command.
pub async fn run() -> Result<()> {
    let config = load_config(None);
    let config_path = get_config_path();

    println!();
    println!("{}", "⚔ Leonidas Status".cyan().bold());
    println!();

    // Config
    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        config_path.display(),
        presence(config_path.exists(), "not found")
    );

    // Discord
    let token = if config.discord.is_configured() {
        format!("{} (token set)", "✓".green())
    } else {
        format!("{}", "· not configured".dimmed())
    };
    println!("  {:<18} {}", "Discord:".bold(), token);
    if let Some(guild) = &config.discord.guild_id {
        println!("  {:<18} {}", "Guild:".bold(), guild);
    }

    // Agent project
    let agent = &config.agent;
    let project = agent.project_path();
    println!(
        "  {:<18} {} {}",
        "Project:".bold(),
        project.display(),
        presence(project.is_dir(), "not found")
    );

    // Env file
    let store = EnvFileStore::new(agent.env_file_path());
    println!(
        "  {:<18} {} {}",
        "Env file:".bold(),
        store.path().display(),
        presence(store.path().exists(), "not found")
    );
    match store.records().await {
        Ok(records) => {
            let latest = records
                .last()
                .map(|r| format!(" | latest: {}", mask_secret(&r.api_key)))
                .unwrap_or_default();
            println!(
                "  {:<18} {}{}",
                "Credentials:".bold(),
                records.len(),
                latest.dimmed()
            );
        }
        Err(e) => println!("  {:<18} {}", "Credentials:".bold(), e.to_string().red()),
    }

    // Timeouts
    let configure = agent
        .configure_timeout()
        .map(|d| format!("{}s", d.as_secs()))
        .unwrap_or_else(|| "none".to_string());
    println!(
        "  {:<18} {} | configure: {}",
        "Timeouts:".bold(),
        format!("goal: {}s", agent.goal_timeout().as_secs()).dimmed(),
        configure.dimmed(),
    );

    // Query helper
    let query = match &config.query.api_url {
        Some(url) => format!("{} {}", "✓".green(), url),
        None => format!("{}", "· not configured".dimmed()),
    };
    println!("  {:<18} {}", "Query:".bold(), query);

    println!();

    Ok(())
}
