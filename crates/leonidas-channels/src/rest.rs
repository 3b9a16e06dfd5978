//! Discord REST client — interaction callbacks, follow-ups, threads, DMs.
//!
//! Every call goes through [`DiscordRest::request`], which retries on
//! HTTP 429 (honouring `retry_after`) and on 5xx responses.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};

use leonidas_core::bus::types::{Interaction, OutboundMessage};

use crate::base::{ChatClient, CommandSpec};
use crate::discord::split_message;

/// Discord REST API base URL.
pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Discord message length limit.
pub const DISCORD_MAX_LEN: usize = 2000;

/// Attempts per request before giving up.
const MAX_ATTEMPTS: u32 = 3;

/// Interaction callback: deferred channel message with source.
const CALLBACK_DEFERRED: u64 = 5;

/// Interaction callback: immediate channel message.
const CALLBACK_MESSAGE: u64 = 4;

/// Message flag: only the invoking user sees it.
const FLAG_EPHEMERAL: u64 = 64;

/// Channel type for a public thread.
const PUBLIC_THREAD: u64 = 11;

/// Minutes of inactivity before a created thread archives itself.
const THREAD_ARCHIVE_MINUTES: u64 = 60;

/// Cheap-to-clone Discord REST client.
#[derive(Clone)]
pub struct DiscordRest {
    http: reqwest::Client,
    token: String,
    api_base: String,
}

impl std::fmt::Debug for DiscordRest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordRest")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl DiscordRest {
    /// Create a client for the public Discord API.
    pub fn new(token: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            token: token.into(),
            api_base: DISCORD_API_BASE.to_string(),
        }
    }

    /// Point the client at a different API base (used by tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Issue a request and return the decoded JSON body (`Null` when empty).
    async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> anyhow::Result<Value> {
        let url = format!("{}/{}", self.api_base, path.trim_start_matches('/'));

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let mut req = self
                .http
                .request(method.clone(), &url)
                .header("Authorization", format!("Bot {}", self.token));
            if let Some(body) = body {
                req = req.json(body);
            }
            let resp = req.send().await?;
            let status = resp.status();

            if status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                if text.trim().is_empty() {
                    return Ok(Value::Null);
                }
                return Ok(serde_json::from_str(&text)?);
            }

            let body_text = resp.text().await.unwrap_or_default();
            if attempts >= MAX_ATTEMPTS || !(status.as_u16() == 429 || status.is_server_error()) {
                return Err(anyhow::anyhow!(
                    "discord {} {} failed (HTTP {}): {}",
                    method,
                    path,
                    status,
                    body_text
                ));
            }

            let wait = if status.as_u16() == 429 {
                let retry_after = serde_json::from_str::<Value>(&body_text)
                    .ok()
                    .and_then(|v| v["retry_after"].as_f64())
                    .unwrap_or(1.0);
                warn!(retry_after_s = retry_after, attempt = attempts, "discord rate limited");
                Duration::from_secs_f64(retry_after.max(0.0))
            } else {
                warn!(status = %status, attempt = attempts, "discord server error, retrying in 1s");
                Duration::from_secs(1)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Post a message to a channel or thread, chunked to the length limit.
    pub async fn send_message(&self, channel_id: &str, content: &str) -> anyhow::Result<()> {
        let path = format!("channels/{channel_id}/messages");
        for chunk in split_message(content, DISCORD_MAX_LEN) {
            let body = json!({ "content": chunk });
            self.request(Method::POST, &path, Some(&body)).await?;
        }
        Ok(())
    }

    /// Answer an interaction immediately with an ephemeral message.
    pub async fn reject(&self, interaction: &Interaction, content: &str) -> anyhow::Result<()> {
        let body = json!({
            "type": CALLBACK_MESSAGE,
            "data": { "content": content, "flags": FLAG_EPHEMERAL }
        });
        self.request(Method::POST, &callback_path(interaction), Some(&body))
            .await
            .map(|_| ())
    }

    /// Overwrite the application's slash commands, globally or for one guild.
    pub async fn register_commands(
        &self,
        application_id: &str,
        guild_id: Option<&str>,
        commands: &[CommandSpec],
    ) -> anyhow::Result<()> {
        let path = match guild_id {
            Some(guild) => format!("applications/{application_id}/guilds/{guild}/commands"),
            None => format!("applications/{application_id}/commands"),
        };
        let body: Vec<Value> = commands
            .iter()
            .map(|c| json!({ "name": c.name, "description": c.description, "type": 1 }))
            .collect();
        self.request(Method::PUT, &path, Some(&Value::Array(body))).await?;
        debug!(count = commands.len(), guild = ?guild_id, "discord commands registered");
        Ok(())
    }
}

fn callback_path(interaction: &Interaction) -> String {
    format!("interactions/{}/{}/callback", interaction.id, interaction.token)
}

#[async_trait]
impl ChatClient for DiscordRest {
    async fn defer(&self, interaction: &Interaction) -> anyhow::Result<()> {
        let body = json!({ "type": CALLBACK_DEFERRED });
        self.request(Method::POST, &callback_path(interaction), Some(&body))
            .await?;
        Ok(())
    }

    async fn followup(&self, interaction: &Interaction, content: &str) -> anyhow::Result<()> {
        if interaction.application_id.is_empty() {
            return Err(anyhow::anyhow!("interaction has no application id"));
        }
        let path = format!("webhooks/{}/{}", interaction.application_id, interaction.token);
        for chunk in split_message(content, DISCORD_MAX_LEN) {
            self.request(Method::POST, &path, Some(&json!({ "content": chunk })))
                .await?;
        }
        Ok(())
    }

    async fn send_direct(&self, user_id: &str, content: &str) -> anyhow::Result<()> {
        let dm = self
            .request(
                Method::POST,
                "users/@me/channels",
                Some(&json!({ "recipient_id": user_id })),
            )
            .await?;
        let channel_id = dm["id"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("discord DM channel response has no id"))?;
        self.send_message(channel_id, content).await
    }

    async fn create_thread(&self, channel_id: &str, name: &str) -> anyhow::Result<String> {
        let body = json!({
            "name": name,
            "type": PUBLIC_THREAD,
            "auto_archive_duration": THREAD_ARCHIVE_MINUTES
        });
        let thread = self
            .request(Method::POST, &format!("channels/{channel_id}/threads"), Some(&body))
            .await?;
        thread["id"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| anyhow::anyhow!("discord thread response has no id"))
    }

    async fn send(&self, msg: &OutboundMessage) -> anyhow::Result<()> {
        self.send_message(&msg.chat_id, &msg.content).await
    }
}
