//! Session bridge — drives one containerized agent run from chat.
//!
//! Sequence for a `summon`:
//!
//! 1. build the image, then launch the container on a PTY with the session
//!    environment exported
//! 2. after the startup delay, write the scripted input (`n\n`)
//! 3. prompt for a goal and wait (bounded) for the invoking user's reply
//! 4. write `<goal>\n`
//!
//! Any failure after launch kills the child; in particular a goal timeout
//! writes nothing beyond the scripted input.
//!
//! The terminal's output is always consumed, either relayed to the session
//! thread or drained, since a child writing to a full pty blocks.

use std::io::Read;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use leonidas_channels::ChatClient;
use leonidas_core::bus::types::{Interaction, OutboundMessage};
use leonidas_core::config::AgentConfig;
use leonidas_core::envfile::SessionEnv;
use leonidas_core::error::{BridgeError, BridgeResult};

use crate::launcher::{AgentProcess, SessionLauncher};
use crate::router::{ReplyFilter, ReplyHandle};

/// Prompt for the agent's goal.
pub const GOAL_PROMPT: &str = "Please enter your goal:";

/// How often relayed output is flushed to the thread.
const RELAY_FLUSH_INTERVAL: Duration = Duration::from_secs(2);

/// Flush early once this much output is buffered.
const RELAY_MAX_BUFFER: usize = 1800;

/// Timing and input for a bridge run.
#[derive(Clone, Debug)]
pub struct BridgeSettings {
    pub scripted_input: String,
    pub startup_delay: Duration,
    pub goal_timeout: Duration,
    pub relay_output: bool,
}

impl From<&AgentConfig> for BridgeSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            scripted_input: config.scripted_input.clone(),
            startup_delay: config.startup_delay(),
            goal_timeout: config.goal_timeout(),
            relay_output: config.relay_output,
        }
    }
}

/// What a successful run did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionReport {
    pub goal: String,
    /// Total bytes written to the terminal.
    pub bytes_written: usize,
}

pub struct SessionBridge {
    chat: Arc<dyn ChatClient>,
    launcher: Arc<dyn SessionLauncher>,
    replies: ReplyHandle,
    env: SessionEnv,
    settings: BridgeSettings,
}

impl SessionBridge {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        launcher: Arc<dyn SessionLauncher>,
        replies: ReplyHandle,
        env: SessionEnv,
        settings: BridgeSettings,
    ) -> Self {
        Self {
            chat,
            launcher,
            replies,
            env,
            settings,
        }
    }

    /// Run the session for `interaction`, relaying output to `thread_id`
    /// when one was created.
    pub async fn run(
        &self,
        interaction: &Interaction,
        thread_id: Option<&str>,
    ) -> BridgeResult<SessionReport> {
        self.launcher.build().await?;
        let mut process = self.launcher.launch(self.env.snapshot()).await?;

        if let Some(output) = process.take_output() {
            match thread_id.filter(|_| self.settings.relay_output) {
                Some(thread) => {
                    spawn_output_relay(output, self.chat.clone(), thread.to_string());
                }
                None => {
                    spawn_output_drain(output);
                }
            }
        }

        let result = self.drive(process.as_mut(), interaction, thread_id).await;
        if let Err(ref e) = result {
            warn!(error = %e, user = %interaction.user_id, "session failed, stopping agent container");
            if let Err(kill_err) = process.kill().await {
                warn!(error = %kill_err, "failed to kill agent container");
            }
        }
        process.detach();
        result
    }

    async fn drive(
        &self,
        process: &mut dyn AgentProcess,
        interaction: &Interaction,
        thread_id: Option<&str>,
    ) -> BridgeResult<SessionReport> {
        tokio::time::sleep(self.settings.startup_delay).await;

        let scripted = self.settings.scripted_input.as_bytes();
        process.write(scripted).await?;
        debug!(bytes = scripted.len(), "scripted input written");

        // The invoking channel (the DM for direct use) or the session thread.
        let mut filter = ReplyFilter::from_user(&interaction.user_id).in_channel(&interaction.channel_id);
        if let Some(thread) = thread_id {
            filter = filter.in_channel(thread);
        }
        let pending = self.replies.expect(filter).await?;
        self.chat
            .followup(interaction, GOAL_PROMPT)
            .await
            .map_err(|e| BridgeError::Chat(e.to_string()))?;

        let reply = pending.recv(Some(self.settings.goal_timeout)).await?;
        let line = format!("{}\n", reply.content);
        process.write(line.as_bytes()).await?;
        info!(user = %interaction.user_id, goal_len = reply.content.len(), "goal forwarded to agent");

        Ok(SessionReport {
            goal: reply.content,
            bytes_written: scripted.len() + line.len(),
        })
    }
}

// ─────────────────────────────────────────────
// Output relay
// ─────────────────────────────────────────────

fn ansi_regex() -> Option<&'static Regex> {
    static ANSI: OnceLock<Option<Regex>> = OnceLock::new();
    ANSI.get_or_init(|| {
        Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]").ok()
    })
    .as_ref()
}

/// Remove terminal escape sequences and carriage returns.
pub fn strip_ansi(text: &str) -> String {
    let cleaned = match ansi_regex() {
        Some(re) => re.replace_all(text, ""),
        None => text.into(),
    };
    cleaned.replace('\r', "")
}

/// Stream terminal output to a chat thread in batches.
///
/// Reading happens on a blocking worker; the returned task ends once the
/// terminal closes and the last batch is sent.
pub fn spawn_output_relay(
    mut output: Box<dyn Read + Send>,
    chat: Arc<dyn ChatClient>,
    thread_id: String,
) -> JoinHandle<()> {
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(64);

    tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; 4096];
        loop {
            match output.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.blocking_send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                // EIO once the child side of the pty closes.
                Err(_) => break,
            }
        }
    });

    tokio::spawn(async move {
        let mut pending: Vec<u8> = Vec::new();
        let mut ticker = tokio::time::interval(RELAY_FLUSH_INTERVAL);
        loop {
            tokio::select! {
                chunk = rx.recv() => match chunk {
                    Some(bytes) => {
                        pending.extend_from_slice(&bytes);
                        if pending.len() >= RELAY_MAX_BUFFER {
                            flush_relay(&mut pending, chat.as_ref(), &thread_id).await;
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => flush_relay(&mut pending, chat.as_ref(), &thread_id).await,
            }
        }
        flush_relay(&mut pending, chat.as_ref(), &thread_id).await;
        debug!(thread = %thread_id, "output relay finished");
    })
}

/// Read and discard terminal output until the terminal closes.
pub fn spawn_output_drain(mut output: Box<dyn Read + Send>) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; 4096];
        let mut total = 0usize;
        loop {
            match output.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        debug!(bytes = total, "agent output drained");
    })
}

async fn flush_relay(pending: &mut Vec<u8>, chat: &dyn ChatClient, thread_id: &str) {
    if pending.is_empty() {
        return;
    }
    let text = strip_ansi(&String::from_utf8_lossy(pending));
    pending.clear();
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    let msg = OutboundMessage::new(thread_id, text);
    if let Err(e) = chat.send(&msg).await {
        warn!(error = %e, thread = %thread_id, "failed to relay agent output");
    }
}
