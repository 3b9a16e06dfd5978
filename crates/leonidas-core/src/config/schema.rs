//! Configuration schema.
//!
//! Hierarchy: `Config` → `DiscordConfig`, `AgentConfig`, `QueryConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.
//! We use `#[serde(rename_all = "camelCase")]` to handle the conversion.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration — loaded from `~/.leonidas/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub discord: DiscordConfig,
    pub agent: AgentConfig,
    pub query: QueryConfig,
}

// ─────────────────────────────────────────────
// Discord
// ─────────────────────────────────────────────

/// Discord bot config.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscordConfig {
    /// Bot token from the Developer Portal.
    #[serde(default)]
    pub token: String,
    /// Allow-list of user IDs. Empty = allow everyone.
    #[serde(default)]
    pub allowed_users: Vec<String>,
    /// Register slash commands on READY.
    #[serde(default = "default_true")]
    pub register_commands: bool,
    /// Register commands for this guild only (instant) instead of globally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            allowed_users: Vec::new(),
            register_commands: true,
            guild_id: None,
        }
    }
}

impl DiscordConfig {
    /// Whether a bot token is present.
    pub fn is_configured(&self) -> bool {
        !self.token.is_empty()
    }
}

// ─────────────────────────────────────────────
// Agent (container + env file)
// ─────────────────────────────────────────────

/// Everything the configurator and the session bridge need.
///
/// Passed by value into each worker; nothing here is read from ambient
/// process state after load.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    /// Env file the credential records are appended to.
    pub env_file: String,
    /// Directory the build/run commands execute in.
    pub project_dir: String,
    /// Program used for both commands (e.g. `docker-compose`).
    pub compose_program: String,
    /// Arguments for the image build.
    pub build_args: Vec<String>,
    /// Arguments for the container run.
    pub run_args: Vec<String>,
    /// Bytes written to the terminal once the container is up.
    pub scripted_input: String,
    /// Delay between launch and the scripted input.
    pub startup_delay_secs: u64,
    /// How long to wait for the user's goal text.
    pub goal_timeout_secs: u64,
    /// Optional bound on the API-key prompt. `None` waits indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configure_timeout_secs: Option<u64>,
    /// Post terminal output into the session thread.
    #[serde(default = "default_true")]
    pub relay_output: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            env_file: "../autogpts/autogpt/.env".to_string(),
            project_dir: "../autogpts/autogptold".to_string(),
            compose_program: "docker-compose".to_string(),
            build_args: vec!["build".into(), "auto-gpt".into()],
            run_args: vec![
                "run".into(),
                "-u".into(),
                "root".into(),
                "--rm".into(),
                "auto-gpt".into(),
                "--gpt4only".into(),
                "--continuous".into(),
            ],
            scripted_input: "n\n".to_string(),
            startup_delay_secs: 10,
            goal_timeout_secs: 30,
            configure_timeout_secs: None,
            relay_output: true,
        }
    }
}

impl AgentConfig {
    /// Env file path.
    pub fn env_file_path(&self) -> PathBuf {
        crate::utils::expand_home(&self.env_file)
    }

    /// Project directory path.
    pub fn project_path(&self) -> PathBuf {
        crate::utils::expand_home(&self.project_dir)
    }

    /// Goal prompt timeout.
    pub fn goal_timeout(&self) -> Duration {
        Duration::from_secs(self.goal_timeout_secs)
    }

    /// Startup delay before the scripted input.
    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    /// API-key prompt timeout, if bounded.
    pub fn configure_timeout(&self) -> Option<Duration> {
        self.configure_timeout_secs.map(Duration::from_secs)
    }
}

// ─────────────────────────────────────────────
// Query helper
// ─────────────────────────────────────────────

/// Settings for the generic `query` HTTP helper.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryConfig {
    /// Value sent verbatim in the `Authorization` header.
    #[serde(default)]
    pub api_key: String,
    /// Default endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.discord.is_configured());
        assert!(config.discord.register_commands);
        assert_eq!(config.agent.goal_timeout_secs, 30);
        assert_eq!(config.agent.startup_delay_secs, 10);
        assert_eq!(config.agent.scripted_input, "n\n");
        assert_eq!(config.agent.build_args, vec!["build", "auto-gpt"]);
        assert!(config.agent.configure_timeout_secs.is_none());
        assert!(config.agent.relay_output);
    }

    #[test]
    fn test_config_from_json_camel_case() {
        let json = serde_json::json!({
            "discord": {
                "token": "bot-token",
                "allowedUsers": ["42"],
                "guildId": "777"
            },
            "agent": {
                "envFile": "/srv/agent/.env",
                "goalTimeoutSecs": 5,
                "runArgs": ["run", "agent"]
            }
        });

        let config: Config = serde_json::from_value(json).unwrap();
        assert_eq!(config.discord.token, "bot-token");
        assert_eq!(config.discord.allowed_users, vec!["42"]);
        assert_eq!(config.discord.guild_id.as_deref(), Some("777"));
        assert_eq!(config.agent.env_file, "/srv/agent/.env");
        assert_eq!(config.agent.goal_timeout(), Duration::from_secs(5));
        assert_eq!(config.agent.run_args, vec!["run", "agent"]);
        // Defaults preserved for missing fields
        assert_eq!(config.agent.compose_program, "docker-compose");
        assert!(config.discord.register_commands);
    }

    #[test]
    fn test_config_json_uses_camel_case() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert!(json["agent"].get("goalTimeoutSecs").is_some());
        assert!(json["agent"].get("envFile").is_some());
        assert!(json["discord"].get("registerCommands").is_some());
        assert!(json["agent"].get("goal_timeout_secs").is_none());
        // Unset optionals are omitted
        assert!(json["agent"].get("configureTimeoutSecs").is_none());
    }

    #[test]
    fn test_configure_timeout_optional() {
        let mut agent = AgentConfig::default();
        assert!(agent.configure_timeout().is_none());
        agent.configure_timeout_secs = Some(120);
        assert_eq!(agent.configure_timeout(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_empty_json_gives_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.agent.project_dir, "../autogpts/autogptold");
        assert!(config.query.api_url.is_none());
    }
}
