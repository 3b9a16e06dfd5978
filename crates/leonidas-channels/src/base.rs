//! Channel traits — the seams between the bot and a chat platform.
//!
//! - [`Channel`]: the long-running inbound side (gateway connection) that
//!   publishes events on the bus.
//! - [`ChatClient`]: the outbound side used by the dispatcher and its
//!   workers (deferrals, follow-ups, threads, DMs).

use async_trait::async_trait;
use leonidas_core::bus::types::{Interaction, OutboundMessage};

/// A slash command to register with the platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
}

/// Inbound side of a chat platform.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Unique channel name (e.g. "discord").
    fn name(&self) -> &str;

    /// Start listening for incoming events.
    ///
    /// Long-running: publishes to the bus until `stop()` is called.
    async fn start(&self) -> anyhow::Result<()>;

    /// Graceful shutdown — stop listening and clean up resources.
    async fn stop(&self) -> anyhow::Result<()>;
}

/// Outbound side of a chat platform.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Acknowledge an interaction now; the result follows later.
    async fn defer(&self, interaction: &Interaction) -> anyhow::Result<()>;

    /// Post a follow-up message on a deferred interaction.
    async fn followup(&self, interaction: &Interaction, content: &str) -> anyhow::Result<()>;

    /// Send a direct message to a user.
    async fn send_direct(&self, user_id: &str, content: &str) -> anyhow::Result<()>;

    /// Create a public thread in `channel_id`; returns the thread's id.
    async fn create_thread(&self, channel_id: &str, name: &str) -> anyhow::Result<String>;

    /// Send a message to a channel or thread.
    async fn send(&self, msg: &OutboundMessage) -> anyhow::Result<()>;
}
