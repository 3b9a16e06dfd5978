//! `leonidas onboard` — write a default configuration file.

use anyhow::Result;
use colored::Colorize;

use leonidas_core::config::{get_config_path, load_config, save_config};

/// Run the onboard command.
pub fn run() -> Result<()> {
    println!();
    println!("{}", "⚔ Leonidas — Setup".cyan().bold());
    println!();

    let config_path = get_config_path();

    if config_path.exists() {
        println!(
            "  {} config already exists at {}",
            "✓".green(),
            config_path.display()
        );
    } else {
        let config = load_config(None); // defaults
        save_config(&config, Some(&config_path))?;
        println!(
            "  {} created config at {}",
            "✓".green(),
            config_path.display()
        );
    }

    println!();
    println!("  Next steps:");
    println!("    1. Set {} in the config (or DISCORD_BOT_SECRET)", "discord.token".bold());
    println!("    2. Point {} at the agent's compose project", "agent.projectDir".bold());
    println!("    3. Run {}", "leonidas gateway".cyan());
    println!();

    Ok(())
}
