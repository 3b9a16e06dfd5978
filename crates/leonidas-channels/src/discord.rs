//! Discord channel — raw Gateway WebSocket for inbound events.
//!
//! Uses the raw Discord Gateway (v10) for receiving events; outbound traffic
//! goes through [`DiscordRest`]. No heavy Discord library required.
//!
//! Features:
//! - Gateway v10 WebSocket with heartbeat, zombie detection and resume
//! - Slash-command interactions published as [`BusEvent::Command`]
//! - Plain messages published as [`BusEvent::Message`] (prompt replies)
//! - Slash-command registration on READY
//! - Allow-list by Discord user ID
//!
//! [`BusEvent::Command`]: leonidas_core::bus::BusEvent::Command
//! [`BusEvent::Message`]: leonidas_core::bus::BusEvent::Message

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use leonidas_core::bus::queue::MessageBus;
use leonidas_core::bus::types::{ChannelKind, InboundMessage, Interaction};

use crate::base::{Channel, CommandSpec};
use crate::rest::DiscordRest;

// ─────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────

/// Default Gateway WebSocket URL.
const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Default intents: GUILDS(1) + GUILD_MESSAGES(512) + DMs(4096) + MESSAGE_CONTENT(32768).
const DEFAULT_INTENTS: u64 = 1 + 512 + 4096 + 32768;

/// Delay before reconnecting after a failed session.
const RECONNECT_DELAY_SECS: u64 = 5;

/// Interaction type for an application (slash) command.
const INTERACTION_APPLICATION_COMMAND: u64 = 2;

/// Ephemeral answer for users outside the allow-list.
const NOT_ALLOWED_TEXT: &str = "You are not allowed to use this bot.";

// Gateway opcodes
const OP_DISPATCH: u64 = 0;
const OP_HEARTBEAT: u64 = 1;
const OP_IDENTIFY: u64 = 2;
const OP_RESUME: u64 = 6;
const OP_RECONNECT: u64 = 7;
const OP_INVALID_SESSION: u64 = 9;
const OP_HELLO: u64 = 10;
const OP_HEARTBEAT_ACK: u64 = 11;

// ─────────────────────────────────────────────
// DiscordChannel
// ─────────────────────────────────────────────

/// Discord channel using the raw Gateway WebSocket.
pub struct DiscordChannel {
    /// Bot token from Discord Developer Portal.
    token: String,
    /// Message bus the gateway publishes to.
    bus: Arc<MessageBus>,
    /// REST client for command registration and rejections.
    rest: DiscordRest,
    /// Allow-list of Discord user IDs. Empty = allow everyone.
    allowed_users: Vec<String>,
    /// Gateway WebSocket URL.
    gateway_url: String,
    /// Gateway intents bitmask.
    intents: u64,
    /// Slash commands to register once READY arrives.
    commands: Vec<CommandSpec>,
    /// Register into this guild only (instant) instead of globally.
    guild_id: Option<String>,
    /// Shutdown signal.
    shutdown: Arc<Notify>,
    /// Set once `stop()` has been called.
    stopping: AtomicBool,
    /// Gateway sequence number for heartbeats.
    seq: Arc<Mutex<Option<u64>>>,
    /// Whether last heartbeat was ACKed (zombie detection).
    heartbeat_acked: Arc<Mutex<bool>>,
    /// Session ID for resume.
    session_id: Mutex<Option<String>>,
    /// Resume gateway URL.
    resume_url: Mutex<Option<String>>,
    /// Application ID learned from READY.
    application_id: Mutex<Option<String>>,
}

impl DiscordChannel {
    /// Create a new Discord channel.
    pub fn new(
        token: String,
        bus: Arc<MessageBus>,
        rest: DiscordRest,
        allowed_users: Vec<String>,
    ) -> Self {
        Self {
            token,
            bus,
            rest,
            allowed_users,
            gateway_url: DEFAULT_GATEWAY_URL.into(),
            intents: DEFAULT_INTENTS,
            commands: Vec::new(),
            guild_id: None,
            shutdown: Arc::new(Notify::new()),
            stopping: AtomicBool::new(false),
            seq: Arc::new(Mutex::new(None)),
            heartbeat_acked: Arc::new(Mutex::new(true)),
            session_id: Mutex::new(None),
            resume_url: Mutex::new(None),
            application_id: Mutex::new(None),
        }
    }

    /// Register `commands` when the gateway becomes READY.
    pub fn with_commands(mut self, commands: Vec<CommandSpec>, guild_id: Option<String>) -> Self {
        self.commands = commands;
        self.guild_id = guild_id;
        self
    }

    /// Check if a sender is allowed.
    fn is_allowed(&self, sender_id: &str) -> bool {
        self.allowed_users.is_empty() || self.allowed_users.iter().any(|u| u == sender_id)
    }

    /// Run the Gateway WebSocket connection with auto-reconnect.
    async fn run_gateway(&self) -> anyhow::Result<()> {
        while !self.stopping.load(Ordering::SeqCst) {
            match self.gateway_session().await {
                Ok(()) => break,
                Err(e) => {
                    if self.stopping.load(Ordering::SeqCst) {
                        break;
                    }
                    warn!(error = %e, "discord gateway error, reconnecting in {RECONNECT_DELAY_SECS}s");
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(RECONNECT_DELAY_SECS)) => {}
                        _ = self.shutdown.notified() => break,
                    }
                }
            }
        }
        info!("discord gateway stopped");
        Ok(())
    }

    /// Single Gateway WebSocket session.
    ///
    /// Returns `Ok` only on shutdown; any other exit is an error so the
    /// caller reconnects (resuming when a session id is known).
    async fn gateway_session(&self) -> anyhow::Result<()> {
        let url = self
            .resume_url
            .lock()
            .await
            .clone()
            .unwrap_or_else(|| self.gateway_url.clone());

        debug!(url = %url, "connecting to discord gateway");
        let (ws_stream, _) = tokio_tungstenite::connect_async(&url).await?;
        let (mut write, mut read) = ws_stream.split();

        // All frames (identify, heartbeats, close) go through one writer task.
        let (ws_tx, mut ws_rx) = mpsc::channel::<WsMessage>(16);
        let writer = tokio::spawn(async move {
            while let Some(frame) = ws_rx.recv().await {
                if let Err(e) = write.send(frame).await {
                    warn!(error = %e, "discord ws write error");
                    break;
                }
            }
        });

        let zombie = Arc::new(Notify::new());
        let mut heartbeat: Option<JoinHandle<()>> = None;

        let result = loop {
            tokio::select! {
                msg = read.next() => {
                    let text = match msg {
                        Some(Ok(WsMessage::Text(t))) => t.to_string(),
                        Some(Ok(WsMessage::Close(frame))) => {
                            break Err(anyhow::anyhow!("gateway closed by server: {frame:?}"));
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            error!(error = %e, "discord ws read error");
                            break Err(e.into());
                        }
                        None => break Err(anyhow::anyhow!("gateway stream ended")),
                    };

                    let payload: Value = match serde_json::from_str(&text) {
                        Ok(v) => v,
                        Err(e) => {
                            warn!(error = %e, "discord ws invalid json");
                            continue;
                        }
                    };

                    if let Some(s) = payload["s"].as_u64() {
                        *self.seq.lock().await = Some(s);
                    }

                    match payload["op"].as_u64().unwrap_or(u64::MAX) {
                        OP_HELLO => {
                            let interval = payload["d"]["heartbeat_interval"].as_u64().unwrap_or(41250);
                            debug!(interval_ms = interval, "discord HELLO received");

                            if let Some(h) = heartbeat.take() {
                                h.abort();
                            }
                            *self.heartbeat_acked.lock().await = true;
                            heartbeat = Some(self.spawn_heartbeat(interval, ws_tx.clone(), zombie.clone()));

                            let hello_reply = self.identify_payload().await;
                            if ws_tx.send(WsMessage::text(hello_reply)).await.is_err() {
                                break Err(anyhow::anyhow!("gateway writer closed"));
                            }
                        }
                        OP_DISPATCH => {
                            let event = payload["t"].as_str().unwrap_or("");
                            self.handle_dispatch(event, &payload["d"]).await;
                        }
                        OP_HEARTBEAT_ACK => {
                            *self.heartbeat_acked.lock().await = true;
                        }
                        OP_HEARTBEAT => {
                            let s = *self.seq.lock().await;
                            let hb = json!({"op": OP_HEARTBEAT, "d": s}).to_string();
                            let _ = ws_tx.send(WsMessage::text(hb)).await;
                        }
                        OP_RECONNECT => {
                            info!("discord server requested reconnect");
                            break Err(anyhow::anyhow!("reconnect requested"));
                        }
                        OP_INVALID_SESSION => {
                            let resumable = payload["d"].as_bool().unwrap_or(false);
                            warn!(resumable = resumable, "discord invalid session");
                            if !resumable {
                                *self.session_id.lock().await = None;
                                *self.resume_url.lock().await = None;
                            }
                            break Err(anyhow::anyhow!("invalid session"));
                        }
                        other => debug!(op = other, "discord opcode ignored"),
                    }
                }
                _ = zombie.notified() => {
                    break Err(anyhow::anyhow!("heartbeat not acknowledged"));
                }
                _ = self.shutdown.notified() => {
                    info!("discord shutdown signal received");
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    break Ok(());
                }
            }
        };

        if let Some(h) = heartbeat {
            h.abort();
        }
        drop(ws_tx);
        // Let the writer flush a pending close frame.
        let _ = tokio::time::timeout(Duration::from_secs(1), writer).await;
        result
    }

    /// IDENTIFY for a fresh session, RESUME when a session id is known.
    async fn identify_payload(&self) -> String {
        let session = self.session_id.lock().await.clone();
        match session {
            Some(sid) => {
                let s = *self.seq.lock().await;
                json!({
                    "op": OP_RESUME,
                    "d": { "token": self.token, "session_id": sid, "seq": s }
                })
            }
            None => json!({
                "op": OP_IDENTIFY,
                "d": {
                    "token": self.token,
                    "intents": self.intents,
                    "properties": { "os": "leonidas", "browser": "leonidas", "device": "leonidas" }
                }
            }),
        }
        .to_string()
    }

    /// Heartbeat loop; fires `zombie` when an ACK goes missing.
    fn spawn_heartbeat(
        &self,
        interval: u64,
        ws_tx: mpsc::Sender<WsMessage>,
        zombie: Arc<Notify>,
    ) -> JoinHandle<()> {
        let seq = self.seq.clone();
        let acked = self.heartbeat_acked.clone();

        tokio::spawn(async move {
            let jitter = interval as f64 * rand_jitter();
            tokio::time::sleep(Duration::from_millis(jitter as u64)).await;

            loop {
                {
                    let mut acked = acked.lock().await;
                    if !*acked {
                        warn!("discord heartbeat not ACKed, requesting reconnect");
                        zombie.notify_one();
                        break;
                    }
                    *acked = false;
                }

                let s = *seq.lock().await;
                let hb = json!({"op": OP_HEARTBEAT, "d": s}).to_string();
                if ws_tx.send(WsMessage::text(hb)).await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(interval)).await;
            }
        })
    }

    /// Route a DISPATCH event.
    async fn handle_dispatch(&self, event: &str, data: &Value) {
        match event {
            "READY" => self.handle_ready(data).await,
            "RESUMED" => info!("discord session resumed"),
            "MESSAGE_CREATE" => self.handle_message_create(data).await,
            "INTERACTION_CREATE" => self.handle_interaction_create(data).await,
            _ => debug!(event = event, "discord event (unhandled)"),
        }
    }

    async fn handle_ready(&self, data: &Value) {
        if let Some(sid) = data["session_id"].as_str() {
            *self.session_id.lock().await = Some(sid.to_string());
        }
        if let Some(url) = data["resume_gateway_url"].as_str() {
            *self.resume_url.lock().await = Some(format!("{url}/?v=10&encoding=json"));
        }
        let app_id = data["application"]["id"].as_str().map(String::from);
        *self.application_id.lock().await = app_id.clone();

        let user = data["user"]["username"].as_str().unwrap_or("unknown");
        info!(user = user, "discord bot READY");

        if let (Some(app_id), false) = (app_id, self.commands.is_empty()) {
            let rest = self.rest.clone();
            let commands = self.commands.clone();
            let guild = self.guild_id.clone();
            tokio::spawn(async move {
                if let Err(e) = rest.register_commands(&app_id, guild.as_deref(), &commands).await {
                    error!(error = %e, "failed to register discord commands");
                }
            });
        }
    }

    /// Handle a MESSAGE_CREATE event from the Gateway.
    async fn handle_message_create(&self, data: &Value) {
        if data["author"]["bot"].as_bool().unwrap_or(false) {
            return;
        }

        let (Some(sender_id), Some(channel_id)) =
            (data["author"]["id"].as_str(), data["channel_id"].as_str())
        else {
            return;
        };

        if !self.is_allowed(sender_id) {
            debug!(sender = %sender_id, channel = %channel_id, "discord message from unauthorized user, ignoring");
            return;
        }

        // Attachment-only messages cannot answer a text prompt.
        let content = data["content"].as_str().unwrap_or("");
        if content.is_empty() {
            debug!(sender = %sender_id, "discord message without text, ignoring");
            return;
        }

        let mut inbound = InboundMessage::new("discord", sender_id, channel_id, content);
        if let Some(username) = data["author"]["username"].as_str() {
            inbound.metadata.insert("username".into(), username.to_string());
        }
        if let Some(msg_id) = data["id"].as_str() {
            inbound.metadata.insert("message_id".into(), msg_id.to_string());
        }
        if let Some(guild_id) = data["guild_id"].as_str() {
            inbound.metadata.insert("guild_id".into(), guild_id.to_string());
        }

        debug!(sender = %sender_id, channel = %channel_id, content_len = content.len(), "discord inbound message");

        if let Err(e) = self.bus.publish_message(inbound).await {
            error!(error = %e, "failed to publish discord message to bus");
        }
    }

    /// Handle an INTERACTION_CREATE event from the Gateway.
    async fn handle_interaction_create(&self, data: &Value) {
        let Some(mut interaction) = parse_interaction(data) else {
            debug!("discord interaction is not a slash command, ignoring");
            return;
        };
        if interaction.application_id.is_empty() {
            if let Some(app_id) = self.application_id.lock().await.clone() {
                interaction.application_id = app_id;
            }
        }

        if !self.is_allowed(&interaction.user_id) {
            warn!(user = %interaction.user_id, command = %interaction.command, "discord command from unauthorized user");
            if let Err(e) = self.rest.reject(&interaction, NOT_ALLOWED_TEXT).await {
                warn!(error = %e, "failed to reject discord interaction");
            }
            return;
        }

        info!(user = %interaction.user_id, command = %interaction.command, "discord command received");
        if let Err(e) = self.bus.publish_command(interaction).await {
            error!(error = %e, "failed to publish discord command to bus");
        }
    }
}

/// Extract a slash-command [`Interaction`] from an INTERACTION_CREATE payload.
///
/// Returns `None` for other interaction types or payloads missing a field
/// every flow needs (id, token, command name, user, channel).
pub fn parse_interaction(data: &Value) -> Option<Interaction> {
    if data["type"].as_u64() != Some(INTERACTION_APPLICATION_COMMAND) {
        return None;
    }

    let id = data["id"].as_str()?;
    let token = data["token"].as_str()?;
    let command = data["data"]["name"].as_str()?;
    // Guild invocations carry `member.user`, DMs carry `user`.
    let user_id = data["member"]["user"]["id"]
        .as_str()
        .or_else(|| data["user"]["id"].as_str())?;
    let channel_id = data["channel_id"]
        .as_str()
        .or_else(|| data["channel"]["id"].as_str())?;

    let guild_id = data["guild_id"].as_str().map(String::from);
    let channel_kind = match data["channel"]["type"].as_u64() {
        Some(kind) => ChannelKind::from_discord_type(kind),
        None if guild_id.is_none() => ChannelKind::Direct,
        None => ChannelKind::Guild,
    };

    let mut interaction = Interaction::new(id, token, channel_id, user_id, command);
    interaction.application_id = data["application_id"].as_str().unwrap_or("").to_string();
    interaction.guild_id = guild_id;
    interaction.channel_kind = channel_kind;
    Some(interaction)
}

/// Split a message into chunks respecting Discord's 2000 char limit.
/// Tries to split at newline boundaries, never inside a UTF-8 character.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut boundary = max_len;
        while !remaining.is_char_boundary(boundary) {
            boundary -= 1;
        }

        // Find last newline within the limit
        let split_at = remaining[..boundary]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(boundary);

        chunks.push(remaining[..split_at].to_string());
        remaining = &remaining[split_at..];
    }

    chunks
}

/// Simple jitter: a random fraction between 0.0 and 1.0 for heartbeat.
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos as f64) / 1_000_000_000.0
}

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn start(&self) -> anyhow::Result<()> {
        if self.token.is_empty() {
            return Err(anyhow::anyhow!("discord token is empty"));
        }

        info!("starting discord channel (gateway v10)");
        self.run_gateway().await
    }

    async fn stop(&self) -> anyhow::Result<()> {
        info!("stopping discord channel");
        self.stopping.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
        Ok(())
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
