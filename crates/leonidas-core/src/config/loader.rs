//! Config loader — reads `~/.leonidas/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.leonidas/config.json`
//! 3. Legacy variables `DISCORD_BOT_SECRET` / `API_KEY`
//! 4. Environment variables `LEONIDAS_<SECTION>__<FIELD>` (override everything)

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::Config;

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    load_config_from_path(&config_path)
}

/// Load config from a specific file path.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(Config::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    let config: Config = match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    apply_env_overrides(config)
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `LEONIDAS_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `DISCORD_BOT_SECRET`, `LEONIDAS_DISCORD__TOKEN` → `discord.token`
/// - `LEONIDAS_DISCORD__GUILD_ID` → `discord.guild_id`
/// - `API_KEY`, `LEONIDAS_QUERY__API_KEY` → `query.api_key`
/// - `LEONIDAS_QUERY__API_URL` → `query.api_url`
/// - `LEONIDAS_AGENT__ENV_FILE` → `agent.env_file`
/// - `LEONIDAS_AGENT__PROJECT_DIR` → `agent.project_dir`
/// - `LEONIDAS_AGENT__GOAL_TIMEOUT_SECS` → `agent.goal_timeout_secs`
/// - `LEONIDAS_AGENT__STARTUP_DELAY_SECS` → `agent.startup_delay_secs`
/// - `LEONIDAS_AGENT__RELAY_OUTPUT` → `agent.relay_output`
fn apply_env_overrides(mut config: Config) -> Config {
    // Legacy names first so the prefixed ones win
    if let Ok(val) = std::env::var("DISCORD_BOT_SECRET") {
        config.discord.token = val;
    }
    if let Ok(val) = std::env::var("API_KEY") {
        config.query.api_key = val;
    }

    // Discord
    if let Ok(val) = std::env::var("LEONIDAS_DISCORD__TOKEN") {
        config.discord.token = val;
    }
    if let Ok(val) = std::env::var("LEONIDAS_DISCORD__GUILD_ID") {
        config.discord.guild_id = Some(val);
    }

    // Query
    if let Ok(val) = std::env::var("LEONIDAS_QUERY__API_KEY") {
        config.query.api_key = val;
    }
    if let Ok(val) = std::env::var("LEONIDAS_QUERY__API_URL") {
        config.query.api_url = Some(val);
    }

    // Agent
    if let Ok(val) = std::env::var("LEONIDAS_AGENT__ENV_FILE") {
        config.agent.env_file = val;
    }
    if let Ok(val) = std::env::var("LEONIDAS_AGENT__PROJECT_DIR") {
        config.agent.project_dir = val;
    }
    if let Ok(val) = std::env::var("LEONIDAS_AGENT__GOAL_TIMEOUT_SECS") {
        if let Ok(n) = val.parse::<u64>() {
            config.agent.goal_timeout_secs = n;
        }
    }
    if let Ok(val) = std::env::var("LEONIDAS_AGENT__STARTUP_DELAY_SECS") {
        if let Ok(n) = val.parse::<u64>() {
            config.agent.startup_delay_secs = n;
        }
    }
    if let Ok(val) = std::env::var("LEONIDAS_AGENT__RELAY_OUTPUT") {
        config.agent.relay_output = val == "true" || val == "1";
    }

    config
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
