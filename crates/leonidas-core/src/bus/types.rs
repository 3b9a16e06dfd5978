//! Bus event types — what the chat gateway hands to the dispatcher.
//!
//! Two kinds of inbound traffic exist: plain chat messages (used to answer
//! pending prompts) and slash-command interactions (used to start flows).

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Where an interaction was invoked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelKind {
    /// A guild text channel (or thread).
    Guild,
    /// A direct-message channel with the bot.
    Direct,
}

impl ChannelKind {
    /// Map a Discord channel type number to a kind.
    ///
    /// `1` (DM) and `3` (group DM) are direct; everything else is treated
    /// as a guild channel.
    pub fn from_discord_type(kind: u64) -> Self {
        match kind {
            1 | 3 => ChannelKind::Direct,
            _ => ChannelKind::Guild,
        }
    }
}

/// An inbound chat message.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    /// Channel name (e.g. "discord").
    pub channel: String,
    /// Author identifier.
    pub sender_id: String,
    /// Chat channel identifier.
    pub chat_id: String,
    /// Text content of the message.
    pub content: String,
    /// When the message was received.
    pub timestamp: DateTime<Utc>,
    /// Channel-specific metadata (e.g. message_id, username, guild_id).
    pub metadata: HashMap<String, String>,
}

impl InboundMessage {
    /// Create a new inbound message with minimal required fields.
    pub fn new(
        channel: impl Into<String>,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        InboundMessage {
            channel: channel.into(),
            sender_id: sender_id.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }
}

/// A slash-command invocation.
#[derive(Clone, Debug)]
pub struct Interaction {
    /// Interaction snowflake.
    pub id: String,
    /// Continuation token used for the callback and follow-ups.
    pub token: String,
    /// Application the command belongs to.
    pub application_id: String,
    /// Channel the command was invoked in.
    pub channel_id: String,
    /// Guild or DM.
    pub channel_kind: ChannelKind,
    /// Invoking user.
    pub user_id: String,
    /// Guild the command was invoked in, if any.
    pub guild_id: Option<String>,
    /// Command name (e.g. "summon").
    pub command: String,
    /// When the interaction was received.
    pub timestamp: DateTime<Utc>,
}

impl Interaction {
    /// Create an interaction with the fields every flow relies on.
    pub fn new(
        id: impl Into<String>,
        token: impl Into<String>,
        channel_id: impl Into<String>,
        user_id: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Interaction {
            id: id.into(),
            token: token.into(),
            application_id: String::new(),
            channel_id: channel_id.into(),
            channel_kind: ChannelKind::Guild,
            user_id: user_id.into(),
            guild_id: None,
            command: command.into(),
            timestamp: Utc::now(),
        }
    }

    /// Whether the command came from a direct-message channel.
    pub fn is_direct(&self) -> bool {
        self.channel_kind == ChannelKind::Direct
    }
}

/// Everything the gateway publishes on the bus.
#[derive(Clone, Debug)]
pub enum BusEvent {
    Message(InboundMessage),
    Command(Interaction),
}

/// An outbound message to a chat channel (thread relays, DMs).
#[derive(Clone, Debug)]
pub struct OutboundMessage {
    /// Target chat/conversation identifier.
    pub chat_id: String,
    /// Text content to send.
    pub content: String,
}

impl OutboundMessage {
    /// Create a new outbound message.
    pub fn new(chat_id: impl Into<String>, content: impl Into<String>) -> Self {
        OutboundMessage {
            chat_id: chat_id.into(),
            content: content.into(),
        }
    }
}
