//! Event bus — gateway → dispatcher traffic.

pub mod queue;
pub mod types;

pub use queue::MessageBus;
pub use types::{BusEvent, ChannelKind, InboundMessage, Interaction, OutboundMessage};
